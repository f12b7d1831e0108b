//! Consumer-side session handle.
//!
//! ## Lifecycle
//! - [`Session::open`] initializes the decoder and starts the worker thread.
//! - [`Session::feed`] / [`Feeder::feed`] queue compressed input from any thread.
//! - [`Session::dispatch`] runs on the consumer loop after a wake and delivers queued events.
//! - [`Session::close`] stops and joins the worker. It also runs when `End` is delivered and
//!   when the handle is dropped, and is idempotent.
//!
//! The worker and the handle share state through an `Arc`, so the state stays alive for as long
//! as the worker can touch it.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use flac_stream_types::SessionStatus;

use crate::callbacks::SessionCallbacks;
use crate::config::SessionConfig;
use crate::decoder::StreamDecoder;
use crate::error::{SessionError, SetupError, UsageError};
use crate::event::Event;
use crate::outbox::SharedWake;
use crate::shared::Shared;
use crate::{status, worker};

/// Consumer callback receiving one event per invocation.
pub type EventCallback = Box<dyn FnMut(Event) + Send>;

/// Process-unique session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning handle for one decode stream.
pub struct Session {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Callback slot. Emptied by `close`; temporarily emptied while a dispatch runs.
    delivery: Mutex<Option<EventCallback>>,
    /// Serializes dispatches so events are never delivered out of order.
    dispatching: Mutex<()>,
}

impl Session {
    /// Open a session around `decoder`.
    ///
    /// `waker` is invoked (from the worker thread) whenever a batch of events becomes pending;
    /// the consumer is expected to call [`Session::dispatch`] in response.
    pub fn open<D, F>(
        decoder: D,
        config: &SessionConfig,
        waker: SharedWake,
        on_event: F,
    ) -> Result<Self, SessionError>
    where
        D: StreamDecoder + 'static,
        F: FnMut(Event) + Send + 'static,
    {
        Self::open_boxed(
            SessionId::next(),
            Box::new(decoder),
            config,
            waker,
            Box::new(on_event),
        )
        .map_err(SessionError::from)
    }

    pub(crate) fn open_boxed(
        id: SessionId,
        mut decoder: Box<dyn StreamDecoder>,
        config: &SessionConfig,
        waker: SharedWake,
        on_event: EventCallback,
    ) -> Result<Self, SetupError> {
        let shared = Arc::new(Shared::new(id, waker));

        if let Err(e) = decoder.init_stream(Arc::new(SessionCallbacks::new(shared.clone()))) {
            tracing::warn!(session = %id, "decoder init failed: {e}");
            decoder.finish();
            shared.request_stop();
            return Err(e);
        }

        let worker = match worker::spawn(decoder, shared.clone(), config) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(session = %id, "worker spawn failed: {e}");
                shared.request_stop();
                return Err(e);
            }
        };

        tracing::debug!(session = %id, thread = %config.thread_name, "session opened");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            delivery: Mutex::new(Some(on_event)),
            dispatching: Mutex::new(()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// `true` until the session is closed or its `End` event was delivered.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Queue compressed input. A zero-length feed is a no-op.
    pub fn feed(&self, bytes: impl Into<Vec<u8>>) -> Result<(), UsageError> {
        self.shared.feed(bytes.into())
    }

    /// Declare that no more input follows. Idempotent.
    pub fn end_input(&self) -> Result<(), UsageError> {
        self.shared.end_input()
    }

    /// Cloneable handle for feeding from producer threads.
    pub fn feeder(&self) -> Feeder {
        Feeder {
            shared: self.shared.clone(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        status::snapshot(&self.shared.lock())
    }

    /// Deliver every pending event to the callback, in order. Returns how many were delivered.
    ///
    /// Must run on the consumer loop and must not be called from inside the callback. When the
    /// batch contains `End`, the session is closed before this returns.
    pub fn dispatch(&self) -> usize {
        let _serial = lock(&self.dispatching);

        let events = self.shared.take_events();
        if events.is_empty() {
            return 0;
        }

        let Some(mut callback) = lock(&self.delivery).take() else {
            tracing::debug!(
                session = %self.id(),
                dropped = events.len(),
                "no event callback registered; discarding events"
            );
            return 0;
        };

        let mut delivered = 0;
        let mut ended = false;
        for event in events {
            let is_end = matches!(event, Event::End);
            let kind = event.kind();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::error!(
                    session = %self.id(),
                    event = %kind,
                    "event callback panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
            delivered += 1;
            if is_end {
                ended = true;
                break;
            }
        }

        if ended {
            drop(callback);
            self.close();
        } else {
            self.restore_callback(callback);
        }
        delivered
    }

    /// Stop the worker, join it, and release the callback. Idempotent.
    pub fn close(&self) {
        let was_open = self.shared.request_stop();
        self.join_worker();
        lock(&self.delivery).take();
        if was_open {
            tracing::debug!(session = %self.id(), "session closed");
        }
    }

    fn restore_callback(&self, callback: EventCallback) {
        let mut slot = lock(&self.delivery);
        // `close` clears `open` before it empties the slot, so checking under the slot lock
        // cannot resurrect a released callback.
        if self.shared.is_open() {
            *slot = Some(callback);
        }
    }

    fn join_worker(&self) {
        let Some(handle) = lock(&self.worker).take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            tracing::warn!(session = %self.id(), "close called on the worker thread; not joining");
            return;
        }
        if handle.join().is_err() {
            tracing::error!(session = %self.id(), "decode worker panicked");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Producer-side handle: feeds input without owning the session.
#[derive(Clone)]
pub struct Feeder {
    shared: Arc<Shared>,
}

impl Feeder {
    pub fn session_id(&self) -> SessionId {
        self.shared.id
    }

    pub fn feed(&self, bytes: impl Into<Vec<u8>>) -> Result<(), UsageError> {
        self.shared.feed(bytes.into())
    }

    pub fn end_input(&self) -> Result<(), UsageError> {
        self.shared.end_input()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
