//! Contract between the session and an opaque stream decoder.
//!
//! A decoder is driven one bounded step at a time by the session worker
//! ([`StreamDecoder::decode_one_unit`]). While stepping it pulls compressed bytes and pushes
//! results exclusively through the [`DecoderCallbacks`] it was initialized with.

use std::fmt;
use std::sync::Arc;

use crate::error::SetupError;

/// Result of a read callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were written to the front of the buffer.
    Continue(usize),
    /// No more input will ever arrive (input ended or the session is stopping).
    EndOfStream,
    /// The reader failed; the decoder should abort the current step.
    Abort,
}

/// Result of a frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    Continue,
    Abort,
}

/// Coarse decoder state, checked by the worker after every step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// `init_stream` was not called yet.
    Uninitialized,
    /// Ready for (more) decode steps.
    Normal,
    /// The input reported end of stream and everything buffered was decoded.
    EndOfStream,
    /// Unrecoverable failure; further steps do nothing.
    Aborted,
}

/// Header fields of one decoded frame, as stated by the source stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub sample_rate: u32,
    pub channels: u32,
    /// Source bit depth (not normalized).
    pub bits_per_sample: u32,
    /// Samples per channel in this frame.
    pub block_size: usize,
}

/// One decoded frame: a header plus one sample plane per channel.
///
/// Sample values are right-aligned at the source bit depth, e.g. a 16-bit source yields values
/// in `i16::MIN..=i16::MAX`.
#[derive(Debug)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub planes: &'a [&'a [i32]],
}

/// Stream-level parameters reported once before any frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// Total samples per channel, when the stream states it.
    pub total_samples: Option<u64>,
}

/// Raw Vorbis comment block. Entries are unparsed `KEY=value` strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: Option<String>,
    pub comments: Vec<String>,
}

/// Metadata block reported by the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    VorbisComment(VorbisComment),
    Picture { media_type: String },
    /// Any block the session has no use for.
    Other { kind: String },
}

/// Non-fatal decode problem reported through [`DecoderCallbacks::error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeErrorStatus {
    LostSync,
    BadHeader,
    FrameCrcMismatch,
    /// Anything else, with the decoder's own description.
    Other(String),
}

impl fmt::Display for DecodeErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorStatus::LostSync => f.write_str("lost sync"),
            DecodeErrorStatus::BadHeader => f.write_str("bad frame header"),
            DecodeErrorStatus::FrameCrcMismatch => f.write_str("frame crc mismatch"),
            DecodeErrorStatus::Other(msg) => f.write_str(msg),
        }
    }
}

/// Callback slots a decoder uses while stepping.
///
/// All callbacks run on the worker thread, inside `decode_one_unit`. `read` may block.
pub trait DecoderCallbacks: Send + Sync {
    /// Fill the front of `buf` with compressed input.
    fn read(&self, buf: &mut [u8]) -> ReadStatus;
    /// Receive one decoded frame.
    fn frame_decoded(&self, frame: &Frame<'_>) -> WriteStatus;
    /// Receive one metadata block.
    fn metadata(&self, block: &MetadataBlock);
    /// Receive a recoverable decode error.
    fn error(&self, status: &DecodeErrorStatus);
}

/// An opaque, callback-driven stream decoder.
///
/// Construction is the implementor's constructor; release is `finish` followed by `Drop`.
pub trait StreamDecoder: Send {
    /// Attach the callbacks. Called exactly once, before any step.
    fn init_stream(&mut self, callbacks: Arc<dyn DecoderCallbacks>) -> Result<(), SetupError>;

    /// Run one bounded decode step (metadata, one frame, or end-of-stream detection).
    ///
    /// Returns `false` when the step failed.
    fn decode_one_unit(&mut self) -> bool;

    fn state(&self) -> DecoderState;

    /// Release decoding resources and the callbacks. Idempotent.
    fn finish(&mut self);
}
