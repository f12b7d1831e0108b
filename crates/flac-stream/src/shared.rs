//! State shared between a session handle, its worker thread and the decoder callbacks.
//!
//! Everything mutable sits behind one mutex. One condition variable on that mutex carries the
//! worker's "input arrived or stop requested" wait.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use flac_stream_types::Format;

use crate::error::UsageError;
use crate::event::Event;
use crate::outbox::{Outbox, SharedWake};
use crate::queue::InputQueue;
use crate::session::SessionId;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) bytes_fed: u64,
    pub(crate) bytes_read: u64,
    pub(crate) frames_decoded: u64,
    pub(crate) decode_errors: u64,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) input: InputQueue,
    pub(crate) outbox: Outbox,
    /// Last announced format; `None` until the first frame.
    pub(crate) format: Option<Format>,
    /// Cleared by `close` (explicit, on drop, or after `End` delivery).
    pub(crate) open: bool,
    /// Worker must stop at the next opportunity.
    pub(crate) stopped: bool,
    /// Producer promised no more input.
    pub(crate) input_ended: bool,
    /// `End` was queued.
    pub(crate) ended: bool,
    /// Input was handed to the decoder since the last `Done`.
    pub(crate) needs_done: bool,
    pub(crate) counters: Counters,
}

impl SessionState {
    fn new() -> Self {
        Self {
            input: InputQueue::new(),
            outbox: Outbox::default(),
            format: None,
            open: true,
            stopped: false,
            input_ended: false,
            ended: false,
            needs_done: false,
            counters: Counters::default(),
        }
    }

    /// The read path has nothing to return yet and must wait.
    pub(crate) fn starved(&self) -> bool {
        self.input.is_empty() && !self.stopped && !self.input_ended
    }

    fn check_accepts_input(&self) -> Result<(), UsageError> {
        if !self.open || self.ended {
            return Err(UsageError::Closed);
        }
        if self.input_ended {
            return Err(UsageError::InputEnded);
        }
        Ok(())
    }
}

pub(crate) struct Shared {
    pub(crate) id: SessionId,
    state: Mutex<SessionState>,
    input_changed: Condvar,
    waker: SharedWake,
}

impl Shared {
    pub(crate) fn new(id: SessionId, waker: SharedWake) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::new()),
            input_changed: Condvar::new(),
            waker,
        }
    }

    /// Lock the session state.
    ///
    /// A panic while holding the lock cannot leave the state half-updated in a way the other
    /// side cares about, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the read path has something to act on: input, stop, or end of input.
    ///
    /// This is the worker's only wait. `wait_while` re-checks the predicate after every wake-up.
    pub(crate) fn wait_for_input<'a>(
        &self,
        guard: MutexGuard<'a, SessionState>,
    ) -> MutexGuard<'a, SessionState> {
        self.input_changed
            .wait_while(guard, |st| st.starved())
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event for the consumer, waking it if no wake is pending.
    pub(crate) fn emit(&self, st: &mut SessionState, event: Event) {
        if st.outbox.push(event) {
            self.waker.wake();
        }
    }

    pub(crate) fn feed(&self, bytes: Vec<u8>) -> Result<(), UsageError> {
        let mut st = self.lock();
        st.check_accepts_input()?;
        if bytes.is_empty() {
            return Ok(());
        }
        let len = bytes.len();
        st.counters.bytes_fed += len as u64;
        st.input.push(bytes);
        drop(st);

        self.input_changed.notify_all();
        tracing::trace!(session = %self.id, bytes = len, "input fed");
        Ok(())
    }

    pub(crate) fn end_input(&self) -> Result<(), UsageError> {
        let mut st = self.lock();
        if st.input_ended && st.open {
            return Ok(());
        }
        st.check_accepts_input()?;
        st.input_ended = true;
        drop(st);

        self.input_changed.notify_all();
        tracing::debug!(session = %self.id, "input ended");
        Ok(())
    }

    /// Mark the session closed and ask the worker to stop. Returns whether it was open.
    pub(crate) fn request_stop(&self) -> bool {
        let mut st = self.lock();
        let was_open = st.open;
        st.open = false;
        st.stopped = true;
        st.input.clear();
        drop(st);

        self.input_changed.notify_all();
        was_open
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub(crate) fn is_open(&self) -> bool {
        let st = self.lock();
        st.open
    }

    /// Terminal success path: owed `Done`, then exactly one `End`.
    ///
    /// Does nothing when the stream already ended or the session is stopping.
    pub(crate) fn finish_stream(&self) {
        let mut st = self.lock();
        if st.ended || st.stopped {
            return;
        }
        if st.needs_done {
            st.needs_done = false;
            self.emit(&mut st, Event::Done);
        }
        st.ended = true;
        self.emit(&mut st, Event::End);
    }

    /// Take every pending event, re-arming the consumer wake.
    pub(crate) fn take_events(&self) -> Vec<Event> {
        self.lock().outbox.take()
    }
}
