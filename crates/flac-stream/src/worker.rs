//! Decode worker: one background thread per session driving the decoder step by step.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::SessionConfig;
use crate::decoder::{DecoderState, StreamDecoder};
use crate::error::SetupError;
use crate::session::panic_message;
use crate::shared::Shared;

/// Why the worker loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerExit {
    /// `close` was requested; no `End` is emitted.
    Stopped,
    /// Decoder reached end of stream.
    EndOfStream,
    /// Decoder entered its aborted state.
    Aborted,
    /// Too many consecutive failed steps.
    FailureLimit(u32),
    /// The decoder panicked mid-step.
    Panicked,
}

/// Spawn the worker thread. The decoder moves onto that thread and is released there.
pub(crate) fn spawn(
    decoder: Box<dyn StreamDecoder>,
    shared: Arc<Shared>,
    config: &SessionConfig,
) -> Result<JoinHandle<()>, SetupError> {
    let config = config.clone();
    thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || run(decoder, &shared, &config))
        .map_err(SetupError::Thread)
}

fn run(mut decoder: Box<dyn StreamDecoder>, shared: &Shared, config: &SessionConfig) {
    tracing::debug!(session = %shared.id, "decode worker started");
    let exit = panic::catch_unwind(AssertUnwindSafe(|| {
        decode_loop(decoder.as_mut(), shared, config)
    }))
    .unwrap_or_else(|payload| {
        tracing::error!(
            session = %shared.id,
            panic = panic_message(payload.as_ref()),
            "decoder panicked"
        );
        WorkerExit::Panicked
    });

    // A panicked decoder may be mid-update; it is dropped without `finish`.
    if exit != WorkerExit::Panicked {
        decoder.finish();
    }
    drop(decoder);

    match exit {
        WorkerExit::Stopped => {
            tracing::debug!(session = %shared.id, "decode worker stopped");
        }
        WorkerExit::EndOfStream => {
            tracing::debug!(session = %shared.id, "end of stream");
            shared.finish_stream();
        }
        WorkerExit::Aborted | WorkerExit::Panicked => {
            tracing::error!(session = %shared.id, "decoder aborted; ending stream");
            shared.finish_stream();
        }
        WorkerExit::FailureLimit(failures) => {
            tracing::error!(
                session = %shared.id,
                failures,
                "decoder kept failing; ending stream"
            );
            shared.finish_stream();
        }
    }
}

fn decode_loop(
    decoder: &mut dyn StreamDecoder,
    shared: &Shared,
    config: &SessionConfig,
) -> WorkerExit {
    let mut failures = 0u32;

    loop {
        let ok = decoder.decode_one_unit();

        if shared.is_stopped() {
            return WorkerExit::Stopped;
        }
        match decoder.state() {
            DecoderState::EndOfStream => return WorkerExit::EndOfStream,
            DecoderState::Aborted => return WorkerExit::Aborted,
            DecoderState::Uninitialized | DecoderState::Normal => {}
        }

        if ok {
            failures = 0;
            continue;
        }

        failures += 1;
        if config.failures_exhausted(failures) {
            return WorkerExit::FailureLimit(failures);
        }
        tracing::debug!(session = %shared.id, failures, "decode step failed; retrying");
        thread::sleep(config.failure_backoff);
    }
}
