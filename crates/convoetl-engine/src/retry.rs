//! Retry policy wrapping fallible sync operations.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use convoetl_types::{BackoffClass, ConnectorError};
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles with each retry, capped at `max_delay`.
    Exponential,
}

/// Bounded retry with backoff for operations failing with [`SyncError`].
///
/// Only errors whose [`SyncError::is_retryable`] is `true` are retried.
/// Fatal errors, invariant violations and exhausted retries propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff: Backoff,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            backoff: Backoff::Fixed,
            max_delay: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Build a validated policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_delay` is zero or exceeds `max_delay`.
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        backoff: Backoff,
        max_delay: Duration,
    ) -> Result<Self> {
        if base_delay.is_zero() {
            bail!("retry delay must be greater than zero");
        }
        if base_delay > max_delay {
            bail!(
                "retry delay ({}s) exceeds max delay ({}s)",
                base_delay.as_secs(),
                max_delay.as_secs()
            );
        }
        Ok(Self {
            max_retries,
            base_delay,
            backoff,
            max_delay,
        })
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Compute the delay before retry number `attempt` (1-based).
    ///
    /// A collaborator-supplied `retry_after_ms` wins. Otherwise the base
    /// delay is scaled by the error's backoff class and grown per strategy.
    /// Either way the result never exceeds `max_delay`.
    #[must_use]
    pub fn delay_for(&self, err: &ConnectorError, attempt: u32) -> Duration {
        if let Some(ms) = err.retry_after_ms {
            return Duration::from_millis(ms).min(self.max_delay);
        }

        let base = match err.backoff_class {
            BackoffClass::Fast => self.base_delay / 2,
            BackoffClass::Normal => self.base_delay,
            BackoffClass::Slow => self.base_delay.saturating_mul(2),
        };

        let delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let exp = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << exp)
            }
        };
        delay.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// `op` receives the 1-based attempt number. Every attempt outcome is
    /// logged; the policy itself keeps no state between calls.
    ///
    /// # Errors
    ///
    /// Returns the last error when it is not retryable or retries are
    /// exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let max_retries = self.max_retries;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt <= max_retries => {
                    if let Some(connector_err) = err.as_connector_error() {
                        let delay = self.delay_for(connector_err, attempt);
                        #[allow(clippy::cast_possible_truncation)]
                        let delay_ms = delay.as_millis() as u64;
                        tracing::warn!(
                            operation,
                            attempt,
                            max_retries,
                            delay_ms,
                            category = %connector_err.category,
                            code = %connector_err.code,
                            "Retryable error, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    if let Some(connector_err) = err.as_connector_error() {
                        if err.is_retryable() {
                            tracing::error!(
                                operation,
                                attempt,
                                max_retries,
                                category = %connector_err.category,
                                code = %connector_err.code,
                                "Max retries exhausted"
                            );
                        } else {
                            tracing::error!(
                                operation,
                                category = %connector_err.category,
                                code = %connector_err.code,
                                "Non-retryable error"
                            );
                        }
                    } else {
                        tracing::error!(operation, kind = err.kind(), "Aborting: {}", err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
