//! Single-threaded consumer loop owning many sessions.
//!
//! Every session gets a waker that sends its id over one shared channel. The loop blocks on
//! that channel and dispatches whichever sessions reported pending events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use flac_stream_types::SessionStatus;

use crate::config::SessionConfig;
use crate::decode::SymphoniaFlacDecoder;
use crate::decoder::StreamDecoder;
use crate::error::{SessionError, UsageError};
use crate::event::Event;
use crate::outbox::Wake;
use crate::session::{Feeder, Session, SessionId};

/// How long `run` waits for a wake before re-checking whether any session is still open.
const IDLE_POLL: Duration = Duration::from_millis(100);

struct LoopWaker {
    id: SessionId,
    tx: Sender<SessionId>,
}

impl Wake for LoopWaker {
    fn wake(&self) {
        // The loop owns the receiver; a send only fails while the loop is being dropped.
        let _ = self.tx.send(self.id);
    }
}

pub struct EventLoop {
    wake_tx: Sender<SessionId>,
    wake_rx: Receiver<SessionId>,
    sessions: HashMap<SessionId, Session>,
    config: SessionConfig,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Loop whose sessions are all opened with `config`.
    pub fn with_config(config: SessionConfig) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        Self {
            wake_tx,
            wake_rx,
            sessions: HashMap::new(),
            config,
        }
    }

    /// Open a session around `decoder`. Events are delivered to `on_event` from `run_once`.
    pub fn open<D, F>(&mut self, decoder: D, on_event: F) -> Result<SessionId, SessionError>
    where
        D: StreamDecoder + 'static,
        F: FnMut(Event) + Send + 'static,
    {
        let id = SessionId::next();
        let waker = Arc::new(LoopWaker {
            id,
            tx: self.wake_tx.clone(),
        });
        let session = Session::open_boxed(
            id,
            Box::new(decoder),
            &self.config,
            waker,
            Box::new(on_event),
        )?;
        self.sessions.insert(id, session);
        tracing::info!(session = %id, open = self.sessions.len(), "session registered");
        Ok(id)
    }

    /// Open a session decoding FLAC with the bundled symphonia decoder.
    pub fn open_flac<F>(&mut self, on_event: F) -> Result<SessionId, SessionError>
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.open(SymphoniaFlacDecoder::new(), on_event)
    }

    pub fn session(&self, id: SessionId) -> Result<&Session, UsageError> {
        self.sessions
            .get(&id)
            .ok_or(UsageError::UnknownSession(id))
    }

    pub fn feed(&self, id: SessionId, bytes: impl Into<Vec<u8>>) -> Result<(), UsageError> {
        self.session(id)?.feed(bytes)
    }

    pub fn end_input(&self, id: SessionId) -> Result<(), UsageError> {
        self.session(id)?.end_input()
    }

    pub fn feeder(&self, id: SessionId) -> Result<Feeder, UsageError> {
        Ok(self.session(id)?.feeder())
    }

    pub fn status(&self, id: SessionId) -> Result<SessionStatus, UsageError> {
        Ok(self.session(id)?.status())
    }

    /// Close a session. Idempotent for known ids; the session stays registered until released.
    pub fn close(&self, id: SessionId) -> Result<(), UsageError> {
        self.session(id)?.close();
        Ok(())
    }

    /// Remove a session from the loop, closing it.
    pub fn release(&mut self, id: SessionId) -> Result<(), UsageError> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or(UsageError::UnknownSession(id))?;
        session.close();
        tracing::debug!(session = %id, "session released");
        Ok(())
    }

    pub fn has_open_sessions(&self) -> bool {
        self.sessions.values().any(Session::is_open)
    }

    /// Wait up to `timeout` for a wake, then dispatch every session that has signalled.
    ///
    /// Returns `false` when the wait timed out without any wake.
    pub fn run_once(&mut self, timeout: Duration) -> bool {
        let first = match self.wake_rx.recv_timeout(timeout) {
            Ok(id) => id,
            Err(RecvTimeoutError::Timeout) => return false,
            // The loop holds a sender, so the channel cannot disconnect.
            Err(RecvTimeoutError::Disconnected) => return false,
        };

        let mut woken = vec![first];
        woken.extend(self.wake_rx.try_iter());
        woken.dedup();

        for id in woken {
            match self.sessions.get(&id) {
                Some(session) => {
                    let delivered = session.dispatch();
                    tracing::trace!(session = %id, delivered, "dispatched");
                }
                None => tracing::debug!(session = %id, "wake for released session ignored"),
            }
        }
        true
    }

    /// Dispatch until no registered session is open.
    pub fn run(&mut self) {
        while self.has_open_sessions() {
            self.run_once(IDLE_POLL);
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        for session in self.sessions.values() {
            session.close();
        }
    }
}
