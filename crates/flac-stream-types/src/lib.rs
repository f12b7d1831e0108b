use std::fmt;

use serde::{Deserialize, Serialize};

/// PCM layout announced to the consumer before the data it describes.
///
/// `bits_per_sample` is the *normalized* container width, not the source depth:
/// 24-bit sources are delivered in 32-bit containers.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Format {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u32,
    /// Container width of one sample, in bits (8, 16 or 32).
    pub bits_per_sample: u32,
}

impl Format {
    /// Build a format from source stream parameters, normalizing the bit depth.
    pub fn from_source(sample_rate: u32, channels: u32, source_bits: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: normalize_bits_per_sample(source_bits),
        }
    }

    /// Bytes occupied by one sample of one channel in `Data` payloads.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes occupied by one interleaved frame (all channels) in `Data` payloads.
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Map a source bit depth to the container width used on output.
///
/// Depths up to 8 stay 8, up to 16 become 16, anything wider becomes 32.
pub fn normalize_bits_per_sample(source_bits: u32) -> u32 {
    match source_bits {
        0..=8 => 8,
        9..=16 => 16,
        _ => 32,
    }
}

/// Ordered `key=value` pairs parsed from a Vorbis comment block.
///
/// Keys are not deduplicated; a stream may carry several `ARTIST` entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Tags(pub Vec<(String, String)>);

impl Tags {
    /// First value stored under `key` (ASCII case-insensitive, as Vorbis comments are).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Discriminant of an outbound session event.
///
/// The numeric values are stable and may be used by foreign consumers.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Output format changed; carries a [`Format`].
    Format = 0,
    /// Tag block decoded; carries [`Tags`].
    Metadata = 1,
    /// Decoded PCM bytes.
    Data = 2,
    /// Decoder is starved and waits for more input.
    Done = 3,
    /// Stream finished; no further events follow.
    End = 4,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Format => "format",
            EventKind::Metadata => "metadata",
            EventKind::Data => "data",
            EventKind::Done => "done",
            EventKind::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a decode session, suitable for logs and JSON output.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    /// `true` until the session is closed or its `End` event was delivered.
    pub open: bool,
    /// `true` once the worker reached end of stream.
    pub ended: bool,
    /// Last announced output format.
    pub format: Option<Format>,
    /// Total bytes accepted by `feed`.
    pub bytes_fed: u64,
    /// Total bytes handed to the decoder by the read callback.
    pub bytes_read: u64,
    /// Frames reported by the decoder.
    pub frames_decoded: u64,
    /// Per-frame errors reported by the decoder (logged, never fatal).
    pub decode_errors: u64,
    /// Bytes fed but not yet read by the decoder.
    pub pending_input_bytes: u64,
    /// Events queued for the consumer but not yet dispatched.
    pub pending_events: usize,
}
