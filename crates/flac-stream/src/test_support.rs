//! Scripted decoders and helpers shared by the session and event loop tests.
//!
//! [`ScriptedDecoder`] reads a tiny record format through the session callbacks:
//!
//! - `F` rate:u32le channels:u8 bits:u8 block:u16le, then planar samples as i32le
//! - `T` vendor:(u16le len, bytes) count:u8, then `count` comments as (u16le len, bytes)
//! - `S` rate:u32le channels:u8 bits:u8 (stream info block)
//! - `E` (reports a decode error and fails the step)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::decoder::{
    DecodeErrorStatus, DecoderCallbacks, DecoderState, Frame, FrameHeader, MetadataBlock,
    ReadStatus, StreamDecoder, StreamInfo, VorbisComment, WriteStatus,
};
use crate::error::SetupError;
use crate::event::Event;

enum ReadFailure {
    /// Input ended; `partial` when some bytes of the record had been read.
    Eof { partial: bool },
    Abort,
}

pub(crate) struct ScriptedDecoder {
    callbacks: Option<Arc<dyn DecoderCallbacks>>,
    state: DecoderState,
    finished: Option<Arc<AtomicBool>>,
}

impl ScriptedDecoder {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: None,
            state: DecoderState::Uninitialized,
            finished: None,
        }
    }

    /// Set `flag` when `finish` runs.
    pub(crate) fn with_finish_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.finished = Some(flag);
        self
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), ReadFailure> {
        let Some(callbacks) = self.callbacks.as_ref() else {
            return Err(ReadFailure::Abort);
        };
        let mut filled = 0;
        while filled < buf.len() {
            match callbacks.read(&mut buf[filled..]) {
                ReadStatus::Continue(n) => filled += n,
                ReadStatus::EndOfStream => {
                    return Err(ReadFailure::Eof {
                        partial: filled > 0,
                    });
                }
                ReadStatus::Abort => return Err(ReadFailure::Abort),
            }
        }
        Ok(())
    }

    fn read_vec(&self, len: usize) -> Result<Vec<u8>, ReadFailure> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u16(&self) -> Result<u16, ReadFailure> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_string(&self) -> Result<String, ReadFailure> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_vec(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn step(&mut self) -> Result<bool, ReadFailure> {
        let mut tag = [0u8; 1];
        self.read_exact(&mut tag)?;
        let Some(callbacks) = self.callbacks.clone() else {
            return Err(ReadFailure::Abort);
        };

        match tag[0] {
            b'F' => {
                let head = self.read_vec(8)?;
                let header = FrameHeader {
                    sample_rate: u32::from_le_bytes([head[0], head[1], head[2], head[3]]),
                    channels: head[4] as u32,
                    bits_per_sample: head[5] as u32,
                    block_size: u16::from_le_bytes([head[6], head[7]]) as usize,
                };
                let mut planes = Vec::with_capacity(header.channels as usize);
                for _ in 0..header.channels {
                    let raw = self.read_vec(header.block_size * 4)?;
                    planes.push(
                        raw.chunks_exact(4)
                            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                            .collect::<Vec<i32>>(),
                    );
                }
                let plane_refs: Vec<&[i32]> = planes.iter().map(Vec::as_slice).collect();
                let frame = Frame {
                    header,
                    planes: &plane_refs,
                };
                if callbacks.frame_decoded(&frame) == WriteStatus::Abort {
                    return Err(ReadFailure::Abort);
                }
                Ok(true)
            }
            b'T' => {
                let vendor = self.read_string()?;
                let mut count = [0u8; 1];
                self.read_exact(&mut count)?;
                let mut comments = Vec::with_capacity(count[0] as usize);
                for _ in 0..count[0] {
                    comments.push(self.read_string()?);
                }
                callbacks.metadata(&MetadataBlock::VorbisComment(VorbisComment {
                    vendor: Some(vendor),
                    comments,
                }));
                Ok(true)
            }
            b'S' => {
                let head = self.read_vec(6)?;
                callbacks.metadata(&MetadataBlock::StreamInfo(StreamInfo {
                    sample_rate: u32::from_le_bytes([head[0], head[1], head[2], head[3]]),
                    channels: head[4] as u32,
                    bits_per_sample: head[5] as u32,
                    total_samples: None,
                }));
                Ok(true)
            }
            b'E' => {
                callbacks.error(&DecodeErrorStatus::Other("scripted error".to_string()));
                Ok(false)
            }
            _ => {
                callbacks.error(&DecodeErrorStatus::LostSync);
                Ok(false)
            }
        }
    }
}

impl StreamDecoder for ScriptedDecoder {
    fn init_stream(&mut self, callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError> {
        self.callbacks = Some(callbacks);
        self.state = DecoderState::Normal;
        Ok(())
    }

    fn decode_one_unit(&mut self) -> bool {
        if self.state != DecoderState::Normal {
            return false;
        }
        match self.step() {
            Ok(ok) => ok,
            Err(ReadFailure::Eof { partial }) => {
                self.state = DecoderState::EndOfStream;
                !partial
            }
            Err(ReadFailure::Abort) => {
                self.state = DecoderState::Aborted;
                false
            }
        }
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn finish(&mut self) {
        self.callbacks = None;
        if let Some(flag) = &self.finished {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Decoder whose every step fails without touching input.
pub(crate) struct FailingDecoder {
    attempts: Arc<AtomicU64>,
    initialized: bool,
}

impl FailingDecoder {
    pub(crate) fn new(attempts: Arc<AtomicU64>) -> Self {
        Self {
            attempts,
            initialized: false,
        }
    }
}

impl StreamDecoder for FailingDecoder {
    fn init_stream(&mut self, _callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError> {
        self.initialized = true;
        Ok(())
    }

    fn decode_one_unit(&mut self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn state(&self) -> DecoderState {
        if self.initialized {
            DecoderState::Normal
        } else {
            DecoderState::Uninitialized
        }
    }

    fn finish(&mut self) {}
}

/// Decoder whose first step panics.
pub(crate) struct PanickingDecoder;

impl StreamDecoder for PanickingDecoder {
    fn init_stream(&mut self, _callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError> {
        Ok(())
    }

    fn decode_one_unit(&mut self) -> bool {
        panic!("decoder blew up");
    }

    fn state(&self) -> DecoderState {
        DecoderState::Normal
    }

    fn finish(&mut self) {}
}

/// Decoder that refuses to initialize.
pub(crate) struct RejectingDecoder;

impl StreamDecoder for RejectingDecoder {
    fn init_stream(&mut self, _callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError> {
        Err(SetupError::DecoderInit("rejected by test decoder".to_string()))
    }

    fn decode_one_unit(&mut self) -> bool {
        false
    }

    fn state(&self) -> DecoderState {
        DecoderState::Uninitialized
    }

    fn finish(&mut self) {}
}

pub(crate) fn frame_record(
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u8,
    planes: &[Vec<i32>],
) -> Vec<u8> {
    assert_eq!(planes.len(), channels as usize);
    let block = planes.first().map_or(0, Vec::len);
    let mut out = vec![b'F'];
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.push(channels);
    out.push(bits_per_sample);
    out.extend_from_slice(&(block as u16).to_le_bytes());
    for plane in planes {
        assert_eq!(plane.len(), block);
        for sample in plane {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}

pub(crate) fn tags_record(vendor: &str, comments: &[&str]) -> Vec<u8> {
    fn push_string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    let mut out = vec![b'T'];
    push_string(&mut out, vendor);
    out.push(comments.len() as u8);
    for comment in comments {
        push_string(&mut out, comment);
    }
    out
}

pub(crate) fn stream_info_record(sample_rate: u32, channels: u8, bits_per_sample: u8) -> Vec<u8> {
    let mut out = vec![b'S'];
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.push(channels);
    out.push(bits_per_sample);
    out
}

pub(crate) fn error_record() -> Vec<u8> {
    vec![b'E']
}

/// A short stream: stream info, tags, then three stereo 16-bit frames.
pub(crate) fn sample_stream() -> Vec<u8> {
    let mut out = stream_info_record(44_100, 2, 16);
    out.extend(tags_record("test vendor", &["TITLE=Scripted", "ARTIST=Nobody"]));
    out.extend(frame_record(
        44_100,
        2,
        16,
        &[vec![0, 1, -1, i16::MAX as i32], vec![2, 3, -2, i16::MIN as i32]],
    ));
    out.extend(frame_record(44_100, 2, 16, &[vec![100; 17], vec![-100; 17]]));
    out.extend(frame_record(44_100, 2, 16, &[vec![7], vec![8]]));
    out
}

/// Receive events until `pred` holds for everything received so far.
pub(crate) fn collect_events(
    rx: &Receiver<Event>,
    pred: impl Fn(&[Event]) -> bool,
    timeout: Duration,
) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while !pred(&events) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => events.push(event),
            Err(_) => panic!("timed out waiting for events; got {events:?}"),
        }
    }
    events
}

/// Concatenated payloads of every `Data` event.
pub(crate) fn data_bytes(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Data(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
        .flatten()
        .copied()
        .collect()
}

/// Encode `planes` as a FLAC stream at 44.1 kHz using verbatim subframes.
///
/// `bits_per_sample` must be 8, 16 or 24 and `block_size` at most 256. Comments, if any, go
/// into a Vorbis comment block after STREAMINFO.
pub(crate) fn flac_stream(
    bits_per_sample: u32,
    planes: &[Vec<i32>],
    block_size: usize,
    comments: &[&str],
) -> Vec<u8> {
    let channels = planes.len();
    let total = planes.first().map_or(0, Vec::len);
    assert!((1..=8).contains(&channels));
    assert!((16..=256).contains(&block_size));
    let size_code: u8 = match bits_per_sample {
        8 => 0b001,
        16 => 0b100,
        24 => 0b110,
        other => panic!("unsupported test bit depth {other}"),
    };

    let mut out = b"fLaC".to_vec();

    // STREAMINFO
    out.push(if comments.is_empty() { 0x80 } else { 0x00 });
    out.extend_from_slice(&[0, 0, 34]);
    out.extend_from_slice(&(block_size as u16).to_be_bytes());
    out.extend_from_slice(&(block_size as u16).to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    let packed: u64 = (44_100u64 << 44)
        | (((channels - 1) as u64) << 41)
        | (((bits_per_sample - 1) as u64) << 36)
        | total as u64;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);

    if !comments.is_empty() {
        let vendor = b"flac-stream tests";
        let mut body = Vec::new();
        body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        body.extend_from_slice(vendor);
        body.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            body.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            body.extend_from_slice(comment.as_bytes());
        }
        out.push(0x80 | 4);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&body);
    }

    let bytes_per_sample = (bits_per_sample / 8) as usize;
    for (number, start) in (0..total).step_by(block_size).enumerate() {
        assert!(number < 128);
        let len = block_size.min(total - start);
        let frame_start = out.len();

        out.extend_from_slice(&[0xFF, 0xF8, 0x69]);
        out.push((((channels - 1) as u8) << 4) | (size_code << 1));
        out.push(number as u8);
        out.push((len - 1) as u8);
        let crc = crc8(&out[frame_start..]);
        out.push(crc);

        for plane in planes {
            out.push(0x02);
            for sample in &plane[start..start + len] {
                out.extend_from_slice(&sample.to_be_bytes()[4 - bytes_per_sample..]);
            }
        }

        let crc = crc16(&out[frame_start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    out
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}
