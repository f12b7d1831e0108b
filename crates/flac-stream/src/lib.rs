//! Push-fed FLAC decoding sessions.
//!
//! Compressed bytes go in through [`Session::feed`]; a background worker drives the decoder and
//! queues [`Event`]s, which the consumer receives in order via [`Session::dispatch`] or an
//! [`EventLoop`].

mod callbacks;
pub mod config;
pub mod decode;
pub mod decoder;
pub mod error;
pub mod event;
pub mod event_loop;
mod metadata;
pub mod outbox;
mod pcm;
pub mod queue;
pub mod session;
mod shared;
mod status;
#[cfg(test)]
mod test_support;
mod worker;

pub use config::SessionConfig;
pub use decode::SymphoniaFlacDecoder;
pub use error::{SessionError, SetupError, UsageError};
pub use event::Event;
pub use event_loop::EventLoop;
pub use outbox::{SharedWake, Wake};
pub use session::{EventCallback, Feeder, Session, SessionId};

pub use flac_stream_types::{EventKind, Format, SessionStatus, Tags};
