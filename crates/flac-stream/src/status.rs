use flac_stream_types::SessionStatus;

use crate::shared::SessionState;

/// Build a status snapshot from locked session state.
pub(crate) fn snapshot(st: &SessionState) -> SessionStatus {
    SessionStatus {
        open: st.open,
        ended: st.ended,
        format: st.format,
        bytes_fed: st.counters.bytes_fed,
        bytes_read: st.counters.bytes_read,
        frames_decoded: st.counters.frames_decoded,
        decode_errors: st.counters.decode_errors,
        pending_input_bytes: st.input.pending_bytes() as u64,
        pending_events: st.outbox.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::session::SessionId;
    use crate::shared::Shared;
    use flac_stream_types::Format;

    #[test]
    fn snapshot_reports_queue_and_outbox_depth() {
        let shared = Shared::new(SessionId::next(), std::sync::Arc::new(|| {}));
        shared.feed(vec![0; 10]).unwrap();
        shared.feed(vec![0; 6]).unwrap();
        {
            let mut st = shared.lock();
            st.format = Some(Format::from_source(44_100, 2, 16));
            shared.emit(&mut st, Event::Done);
        }

        let status = snapshot(&shared.lock());
        assert!(status.open);
        assert!(!status.ended);
        assert_eq!(status.bytes_fed, 16);
        assert_eq!(status.bytes_read, 0);
        assert_eq!(status.pending_input_bytes, 16);
        assert_eq!(status.pending_events, 1);
        assert_eq!(status.format, Some(Format::from_source(44_100, 2, 16)));
    }

    #[test]
    fn snapshot_after_stop_shows_closed_and_drained_input() {
        let shared = Shared::new(SessionId::next(), std::sync::Arc::new(|| {}));
        shared.feed(vec![1, 2, 3]).unwrap();
        shared.request_stop();

        let status = snapshot(&shared.lock());
        assert!(!status.open);
        assert_eq!(status.bytes_fed, 3);
        assert_eq!(status.pending_input_bytes, 0);
    }
}
