//! Retry policy for individual capability invocations.
//!
//! Invocations shell out to the container engine and language toolchains,
//! which fail transiently. Each invocation is retried with exponential
//! backoff (10ms, 20ms, 40ms... capped at 500ms) up to a fixed number of
//! attempts. Conflict errors are never retried.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use crate::constants::{MAX_BACKOFF_DELAY_MS, MAX_OPERATION_ATTEMPTS, STARTING_BACKOFF_DELAY_MS};
use crate::core::DcError;

/// Bounded-attempt retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: usize,
    /// Delay before the first retry, in milliseconds.
    pub starting_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_OPERATION_ATTEMPTS,
            starting_delay_ms: STARTING_BACKOFF_DELAY_MS,
            max_delay_ms: MAX_BACKOFF_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries with no delay in between.
    pub const fn immediate(attempts: usize) -> Self {
        Self {
            attempts,
            starting_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        // base 2 with factor d/2 gives d, 2d, 4d, ...
        ExponentialBackoff::from_millis(2)
            .factor(self.starting_delay_ms / 2)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .take(self.attempts.saturating_sub(1))
    }

    /// Runs `action` until it succeeds, fails with a conflict, or runs out
    /// of attempts.
    ///
    /// `label` names the action in logs, e.g. `orders-api.Build`.
    ///
    /// # Errors
    ///
    /// Conflict errors are returned unchanged. Any other error that persists
    /// through every attempt becomes [`DcError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, label: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0usize;
        let mut conflict = false;

        let result = RetryIf::spawn(self.strategy(), action, |error: &anyhow::Error| {
            failures += 1;
            if is_conflict(error) {
                conflict = true;
                return false;
            }
            if failures < self.attempts {
                tracing::warn!("Action {label} has failed {failures} times. Retrying: {error:#}");
            }
            true
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(error) if conflict => Err(error),
            Err(error) => {
                tracing::error!("Action {label} failed {failures} times: {error:#}");
                Err(DcError::RetriesExhausted {
                    action: label.to_string(),
                    attempts: failures,
                    last_error: format!("{error:#}"),
                }
                .into())
            }
        }
    }
}

fn is_conflict(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.downcast_ref::<DcError>().is_some_and(DcError::is_conflict))
}
