//! Session error taxonomy.
//!
//! Per-frame decode errors are not part of it: they are logged and counted, never returned.

use std::io;

use thiserror::Error;

use crate::session::SessionId;

/// Failure to bring a session up. No worker thread is left running.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("failed to spawn decode worker thread")]
    Thread(#[source] io::Error),
}

/// Invalid call on a session handle. The session state is left untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("session is closed")]
    Closed,

    #[error("session input already ended")]
    InputEnded,

    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Usage(#[from] UsageError),
}
