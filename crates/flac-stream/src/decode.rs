//! FLAC decoding with Symphonia.
//!
//! [`SymphoniaFlacDecoder`] is the default [`StreamDecoder`]. It wraps the session read callback
//! in a non-seekable [`MediaSource`] so Symphonia pulls bytes exactly as the session feeds them:
//! - the first step probes the stream and reports stream info, pictures and tags
//! - every later step reads one packet and reports one decoded frame
//!
//! Symphonia's FLAC decoder left-aligns samples in 32-bit words; frames are shifted back to
//! their source bit depth before they reach the callbacks.
//!
//! Symphonia finds the end of a frame by reading up to the next frame's sync code, so the last
//! frame of the fed data is held back until more input arrives or input ends. A consumer that
//! only feeds in response to `Done` should still call `end_input` once the source is exhausted;
//! otherwise the final frame is never delivered.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;

use crate::decoder::{
    DecodeErrorStatus, DecoderCallbacks, DecoderState, Frame, FrameHeader, MetadataBlock,
    ReadStatus, StreamDecoder, StreamInfo, VorbisComment, WriteStatus,
};
use crate::error::SetupError;

/// Non-seekable media source backed by the session read callback.
struct CallbackSource {
    callbacks: Arc<dyn DecoderCallbacks>,
    position: u64,
}

impl Read for CallbackSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.callbacks.read(buf) {
            ReadStatus::Continue(n) => {
                self.position += n as u64;
                Ok(n)
            }
            ReadStatus::EndOfStream => Ok(0),
            ReadStatus::Abort => Err(io::Error::other("input aborted")),
        }
    }
}

impl Seek for CallbackSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "input stream is not seekable",
            )),
        }
    }
}

impl MediaSource for CallbackSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Probed reader and codec state.
struct Active {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    bits_per_sample: u32,
    /// Reused conversion target, reallocated when the signal spec changes or capacity grows.
    samples: Option<AudioBuffer<i32>>,
}

enum Stage {
    /// Initialized, stream not probed yet.
    Idle,
    Decoding(Box<Active>),
    Finished,
}

/// Outcome of one step, before it is folded into the decoder state.
enum Step {
    Ok,
    Failed,
    EndOfStream,
    Aborted,
}

pub struct SymphoniaFlacDecoder {
    callbacks: Option<Arc<dyn DecoderCallbacks>>,
    stage: Stage,
    state: DecoderState,
}

impl Default for SymphoniaFlacDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SymphoniaFlacDecoder {
    pub fn new() -> Self {
        Self {
            callbacks: None,
            stage: Stage::Idle,
            state: DecoderState::Uninitialized,
        }
    }

    fn probe(&mut self, callbacks: &Arc<dyn DecoderCallbacks>) -> Step {
        let source = CallbackSource {
            callbacks: callbacks.clone(),
            position: 0,
        };
        let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension("flac");

        let probed = match symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok(probed) => probed,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!("input ended before a stream header");
                return Step::EndOfStream;
            }
            Err(e) => {
                callbacks.error(&DecodeErrorStatus::Other(format!("probe failed: {e}")));
                return Step::Aborted;
            }
        };

        let mut format = probed.format;
        let Some(track) = format.default_track() else {
            callbacks.error(&DecodeErrorStatus::Other("no audio track".to_string()));
            return Step::Aborted;
        };
        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = match symphonia::default::get_codecs().make(&params, &DecoderOptions::default())
        {
            Ok(decoder) => decoder,
            Err(e) => {
                callbacks.error(&DecodeErrorStatus::Other(format!("codec init failed: {e}")));
                return Step::Aborted;
            }
        };

        let info = stream_info(&params);
        tracing::debug!(
            sample_rate = info.sample_rate,
            channels = info.channels,
            bits_per_sample = info.bits_per_sample,
            "flac stream probed"
        );
        callbacks.metadata(&MetadataBlock::StreamInfo(info));

        if let Some(rev) = format.metadata().skip_to_latest() {
            report_revision(rev, callbacks.as_ref());
        }

        self.stage = Stage::Decoding(Box::new(Active {
            format,
            decoder,
            track_id,
            bits_per_sample: info.bits_per_sample,
            samples: None,
        }));
        Step::Ok
    }
}

impl Active {
    fn decode_packet(&mut self, callbacks: &dyn DecoderCallbacks) -> Step {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Step::EndOfStream;
            }
            Err(SymphoniaError::ResetRequired) => return Step::EndOfStream,
            Err(SymphoniaError::IoError(e)) => {
                tracing::warn!("flac input failed: {e}");
                return Step::Aborted;
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                callbacks.error(&DecodeErrorStatus::LostSync);
                tracing::debug!("packet read failed: {msg}");
                return Step::Failed;
            }
            Err(e) => {
                callbacks.error(&DecodeErrorStatus::Other(e.to_string()));
                return Step::Failed;
            }
        };

        if packet.track_id() != self.track_id {
            return Step::Ok;
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => deliver(decoded, &mut self.samples, self.bits_per_sample, callbacks),
            Err(SymphoniaError::DecodeError(msg)) => {
                callbacks.error(&decode_error_status(msg));
                Step::Ok
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                Step::Ok
            }
            Err(e) => {
                callbacks.error(&DecodeErrorStatus::Other(e.to_string()));
                Step::Failed
            }
        }
    }
}

/// Convert a decoded buffer to source-depth `i32` planes and hand it to the frame callback.
fn deliver(
    decoded: AudioBufferRef<'_>,
    scratch: &mut Option<AudioBuffer<i32>>,
    bits_per_sample: u32,
    callbacks: &dyn DecoderCallbacks,
) -> Step {
    let spec = *decoded.spec();
    let needs_realloc = scratch
        .as_ref()
        .is_none_or(|buf| *buf.spec() != spec || buf.capacity() < decoded.capacity());
    if needs_realloc {
        *scratch = Some(AudioBuffer::new(decoded.capacity() as u64, spec));
    }
    let Some(samples) = scratch.as_mut() else {
        return Step::Failed;
    };
    decoded.convert(samples);

    let channels = spec.channels.count();
    let shift = 32u32.saturating_sub(bits_per_sample.clamp(1, 32));
    if shift > 0 {
        for ch in 0..channels {
            for s in samples.chan_mut(ch) {
                *s >>= shift;
            }
        }
    }

    let planes: Vec<&[i32]> = (0..channels).map(|ch| samples.chan(ch)).collect();
    let frame = Frame {
        header: FrameHeader {
            sample_rate: spec.rate,
            channels: channels as u32,
            bits_per_sample,
            block_size: samples.frames(),
        },
        planes: &planes,
    };

    match callbacks.frame_decoded(&frame) {
        WriteStatus::Continue => Step::Ok,
        WriteStatus::Abort => Step::Aborted,
    }
}

impl StreamDecoder for SymphoniaFlacDecoder {
    fn init_stream(&mut self, callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError> {
        if self.state != DecoderState::Uninitialized {
            return Err(SetupError::DecoderInit(
                "decoder stream already initialized".to_string(),
            ));
        }
        self.callbacks = Some(callbacks);
        self.state = DecoderState::Normal;
        Ok(())
    }

    fn decode_one_unit(&mut self) -> bool {
        if self.state != DecoderState::Normal {
            return false;
        }
        let Some(callbacks) = self.callbacks.clone() else {
            return false;
        };

        let step = match &mut self.stage {
            Stage::Decoding(active) => Some(active.decode_packet(callbacks.as_ref())),
            Stage::Finished => return false,
            Stage::Idle => None,
        }
        .unwrap_or_else(|| self.probe(&callbacks));

        match step {
            Step::Ok => true,
            Step::Failed => false,
            Step::EndOfStream => {
                self.state = DecoderState::EndOfStream;
                true
            }
            Step::Aborted => {
                self.state = DecoderState::Aborted;
                false
            }
        }
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn finish(&mut self) {
        self.stage = Stage::Finished;
        self.callbacks = None;
    }
}

fn stream_info(params: &CodecParameters) -> StreamInfo {
    StreamInfo {
        sample_rate: params.sample_rate.unwrap_or(0),
        channels: params.channels.map_or(0, |c| c.count() as u32),
        bits_per_sample: params
            .bits_per_sample
            .or(params.bits_per_coded_sample)
            .unwrap_or(32),
        total_samples: params.n_frames,
    }
}

/// Report pictures and rebuild the comment block from a metadata revision.
///
/// Symphonia splits each comment into key and value; entries are re-joined as `KEY=value` so
/// the session applies the same first-`=` rule to every decoder. An empty value is passed on as
/// the bare key.
fn report_revision(rev: &MetadataRevision, callbacks: &dyn DecoderCallbacks) {
    for visual in rev.visuals() {
        callbacks.metadata(&MetadataBlock::Picture {
            media_type: visual.media_type.clone(),
        });
    }

    let comments: Vec<String> = rev
        .tags()
        .iter()
        .map(|tag| format!("{}={}", tag.key, tag.value))
        .collect();
    if comments.is_empty() {
        return;
    }
    callbacks.metadata(&MetadataBlock::VorbisComment(VorbisComment {
        // Symphonia's Vorbis comment reader discards the vendor string.
        vendor: None,
        comments,
    }));
}

fn decode_error_status(msg: &str) -> DecodeErrorStatus {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("crc") {
        DecodeErrorStatus::FrameCrcMismatch
    } else if lower.contains("header") {
        DecodeErrorStatus::BadHeader
    } else {
        DecodeErrorStatus::Other(msg.to_string())
    }
}
