//! Decoder callbacks bound to one session.
//!
//! These run on the worker thread. They translate decoder output into [`Event`]s and implement
//! the starvation protocol: one `Done` per stretch of time the decoder waits for input.

use std::sync::Arc;

use flac_stream_types::Format;

use crate::decoder::{
    DecodeErrorStatus, DecoderCallbacks, Frame, MetadataBlock, ReadStatus, WriteStatus,
};
use crate::event::Event;
use crate::shared::Shared;
use crate::{metadata, pcm};

pub(crate) struct SessionCallbacks {
    shared: Arc<Shared>,
}

impl SessionCallbacks {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl DecoderCallbacks for SessionCallbacks {
    fn read(&self, buf: &mut [u8]) -> ReadStatus {
        if buf.is_empty() {
            return ReadStatus::Continue(0);
        }

        let mut st = self.shared.lock();
        if st.starved() && st.needs_done {
            st.needs_done = false;
            self.shared.emit(&mut st, Event::Done);
            tracing::trace!(session = %self.shared.id, "decoder starved");
        }

        let mut st = self.shared.wait_for_input(st);
        if st.stopped || st.input.is_empty() {
            return ReadStatus::EndOfStream;
        }

        let n = st.input.read_into(buf);
        st.counters.bytes_read += n as u64;
        st.needs_done = true;
        ReadStatus::Continue(n)
    }

    fn frame_decoded(&self, frame: &Frame<'_>) -> WriteStatus {
        let header = &frame.header;
        let format = Format::from_source(header.sample_rate, header.channels, header.bits_per_sample);
        let pcm = pcm::interleave_le(frame);

        let mut st = self.shared.lock();
        st.counters.frames_decoded += 1;
        if st.format != Some(format) {
            st.format = Some(format);
            self.shared.emit(&mut st, Event::Format(format));
            tracing::debug!(
                session = %self.shared.id,
                sample_rate = format.sample_rate,
                channels = format.channels,
                bits_per_sample = format.bits_per_sample,
                source_bits = header.bits_per_sample,
                "output format changed"
            );
        }
        if !pcm.is_empty() {
            self.shared.emit(&mut st, Event::Data(pcm));
        }

        WriteStatus::Continue
    }

    fn metadata(&self, block: &MetadataBlock) {
        match block {
            MetadataBlock::VorbisComment(comment) => {
                let tags = metadata::parse_vorbis_comment(comment);
                tracing::debug!(session = %self.shared.id, tags = tags.len(), "tags received");
                let mut st = self.shared.lock();
                self.shared.emit(&mut st, Event::Metadata(tags));
            }
            MetadataBlock::StreamInfo(info) => {
                tracing::debug!(
                    session = %self.shared.id,
                    sample_rate = info.sample_rate,
                    channels = info.channels,
                    bits_per_sample = info.bits_per_sample,
                    total_samples = ?info.total_samples,
                    "stream info"
                );
            }
            MetadataBlock::Picture { media_type } => {
                tracing::trace!(session = %self.shared.id, media_type = %media_type, "picture block ignored");
            }
            MetadataBlock::Other { kind } => {
                tracing::trace!(session = %self.shared.id, kind = %kind, "metadata block ignored");
            }
        }
    }

    fn error(&self, status: &DecodeErrorStatus) {
        let mut st = self.shared.lock();
        st.counters.decode_errors += 1;
        let total = st.counters.decode_errors;
        drop(st);
        tracing::warn!(session = %self.shared.id, total, "decode error: {status}");
    }
}
