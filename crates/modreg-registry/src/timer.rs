//! Timing of registry operations.

use std::time::{Duration, Instant};

/// Logs the duration of an operation when dropped.
///
/// A timer that saw [`ExecutionTimer::on_fail`] logs at warn level with the
/// failure message; otherwise it logs at info level.
#[derive(Debug)]
pub struct ExecutionTimer {
    operation: String,
    start: Instant,
    failure: Option<String>,
}

impl ExecutionTimer {
    /// Starts timing `operation`.
    #[must_use]
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
            failure: None,
        }
    }

    /// Marks the operation as failed.
    pub fn on_fail(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }

    /// Returns the time elapsed since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns true if the operation was marked as failed.
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Drop for ExecutionTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis();
        match &self.failure {
            Some(message) => tracing::warn!(
                operation = %self.operation,
                elapsed_ms,
                error = %message,
                "Operation failed"
            ),
            None => tracing::info!(
                operation = %self.operation,
                elapsed_ms,
                "Operation succeeded"
            ),
        }
    }
}
