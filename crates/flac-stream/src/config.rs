use std::time::Duration;

/// Tuning parameters for one decode session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Consecutive failed decode steps tolerated before the worker gives up and ends the
    /// stream. `0` disables the limit.
    pub max_consecutive_failures: u32,
    /// Pause between a failed decode step and the next attempt.
    pub failure_backoff: Duration,
    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 32,
            failure_backoff: Duration::from_millis(5),
            thread_name: "flac-decode".to_string(),
        }
    }
}

impl SessionConfig {
    /// `true` when `failures` consecutive failed steps exhaust the retry budget.
    pub(crate) fn failures_exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures > 0 && failures >= self.max_consecutive_failures
    }
}
