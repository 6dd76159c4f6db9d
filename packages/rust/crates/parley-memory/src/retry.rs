//! Bounded retry with per-attempt timeout for durable log and summary store calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{MemoryError, StoreError};
use crate::observability::MemoryEvent;

/// Attempts, per-attempt deadline and doubling backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub attempts: u32,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Delay before the second attempt; doubles afterwards.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(50),
        }
    }
}

/// Terminal failure of a retried call.
#[derive(Debug, Clone)]
pub(crate) struct RetryFailure {
    pub(crate) attempts: u32,
    pub(crate) error: StoreError,
}

impl RetryFailure {
    /// Map to the public taxonomy. Conflicts become concurrency violations.
    pub(crate) fn into_memory_error(
        self,
        operation: &'static str,
        session_id: &str,
    ) -> MemoryError {
        match self.error {
            StoreError::Conflict { session_id, sequence } => MemoryError::ConcurrencyViolation {
                session_id,
                sequence,
                detail: format!("{operation}: a different record already holds this sequence"),
            },
            error => MemoryError::Persistence {
                operation,
                session_id: session_id.to_string(),
                attempts: self.attempts,
                message: error.to_string(),
            },
        }
    }
}

impl RetryPolicy {
    /// Run `call` until it succeeds, fails non-retryably, or the budget runs out.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        session_id: &str,
        mut call: F,
    ) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        event = MemoryEvent::DurableCallRetried.as_str(),
                        operation,
                        session_id,
                        attempt,
                        max_attempts = attempts,
                        error = %error,
                        "durable call failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delay = delay.saturating_mul(2);
                }
                Err(error) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}
