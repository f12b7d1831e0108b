//! Outbound event batching and consumer wake-up.

use std::sync::Arc;

use crate::event::Event;

/// Cross-thread signal that tells the consumer loop a session has events to dispatch.
///
/// `wake` is called from the worker thread while it holds the session lock, so it must not
/// block and must not call back into the session. Sending on a channel is the intended shape.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

impl<F> Wake for F
where
    F: Fn() + Send + Sync,
{
    fn wake(&self) {
        self()
    }
}

/// Shared waker handle stored by a session.
pub type SharedWake = Arc<dyn Wake>;

/// Pending events plus the coalescing wake flag.
///
/// Lives inside the session state, so every access happens under the session lock.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    events: Vec<Event>,
    wake_pending: bool,
}

impl Outbox {
    /// Queue an event. Returns `true` when the caller must wake the consumer, i.e. no wake
    /// has been sent since the last [`Outbox::take`].
    pub(crate) fn push(&mut self, event: Event) -> bool {
        self.events.push(event);
        !std::mem::replace(&mut self.wake_pending, true)
    }

    /// Swap out the whole batch and re-arm the wake.
    pub(crate) fn take(&mut self) -> Vec<Event> {
        self.wake_pending = false;
        std::mem::take(&mut self.events)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}
