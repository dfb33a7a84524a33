//! Polling loop: repeated incremental syncs on a fixed interval.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use crate::errors::SyncError;
use crate::result::PollSummary;

/// Default pause between polling iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Validated polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    interval: Duration,
    max_iterations: Option<u32>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_iterations: None,
        }
    }
}

impl PollOptions {
    /// `max_iterations = None` polls until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval` is zero or `max_iterations` is
    /// `Some(0)`.
    pub fn new(interval: Duration, max_iterations: Option<u32>) -> Result<Self> {
        if interval.is_zero() {
            bail!("polling interval must be greater than zero");
        }
        if max_iterations == Some(0) {
            bail!("polling max_iterations must be at least 1 when set");
        }
        Ok(Self {
            interval,
            max_iterations,
        })
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn max_iterations(&self) -> Option<u32> {
        self.max_iterations
    }
}

/// Drive `iteration` until `max_iterations` or cancellation.
///
/// `iteration` receives the 1-based iteration number and returns the number
/// of new messages. A failed iteration is logged and counted; the loop moves
/// on to the next interval. Cancellation is observed before each iteration
/// and during the sleep, so it never waits out a full interval. An iteration
/// already in progress runs to completion.
pub async fn poll<F, Fut>(
    options: PollOptions,
    cancel: &CancellationToken,
    mut iteration: F,
) -> PollSummary
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<u64, SyncError>>,
{
    let start = tokio::time::Instant::now();
    let mut summary = PollSummary::default();

    tracing::info!(
        interval_secs = options.interval.as_secs(),
        max_iterations = options.max_iterations,
        "Polling started"
    );

    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        summary.iterations += 1;
        match iteration(summary.iterations).await {
            Ok(new_messages) => {
                summary.total_messages += new_messages;
                tracing::info!(
                    iteration = summary.iterations,
                    new_messages,
                    "Poll iteration complete"
                );
            }
            Err(err) => {
                summary.failed_iterations += 1;
                tracing::warn!(
                    iteration = summary.iterations,
                    kind = err.kind(),
                    "Poll iteration failed, continuing: {}",
                    err
                );
            }
        }

        if options
            .max_iterations
            .is_some_and(|max| summary.iterations >= max)
        {
            break;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                summary.cancelled = true;
                break;
            }
            () = tokio::time::sleep(options.interval) => {}
        }
    }

    summary.duration_secs = start.elapsed().as_secs_f64();
    if summary.iterations > 0 {
        #[allow(clippy::cast_precision_loss)]
        let average = summary.total_messages as f64 / f64::from(summary.iterations);
        summary.average_per_iteration = average;
    }

    tracing::info!(
        iterations = summary.iterations,
        failed_iterations = summary.failed_iterations,
        total_messages = summary.total_messages,
        cancelled = summary.cancelled,
        duration_secs = summary.duration_secs,
        "Polling stopped"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoetl_types::ConnectorError;

    fn options(secs: u64, max: Option<u32>) -> PollOptions {
        PollOptions::new(Duration::from_secs(secs), max).unwrap()
    }

    #[test]
    fn options_validation() {
        assert!(PollOptions::new(Duration::ZERO, None).is_err());
        assert!(PollOptions::new(Duration::from_secs(1), Some(0)).is_err());
        assert_eq!(PollOptions::default().interval(), Duration::from_secs(300));
        assert_eq!(PollOptions::default().max_iterations(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_iterations_and_averages() {
        let cancel = CancellationToken::new();
        let summary = poll(options(300, Some(3)), &cancel, |i| async move {
            Ok(u64::from(i) * 10)
        })
        .await;

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.total_messages, 60);
        assert!((summary.average_per_iteration - 20.0).abs() < f64::EPSILON);
        assert!(!summary.cancelled);
        // Two sleeps between three iterations.
        assert!((summary.duration_secs - 600.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_iteration_does_not_stop_loop() {
        let cancel = CancellationToken::new();
        let summary = poll(options(60, Some(3)), &cancel, |i| async move {
            if i == 2 {
                Err(SyncError::from(ConnectorError::not_found("X", "gone")))
            } else {
                Ok(5)
            }
        })
        .await;

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.failed_iterations, 1);
        assert_eq!(summary.total_messages, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let summary = poll(options(3600, None), &cancel, |_| async { Ok(1) }).await;

        assert_eq!(summary.iterations, 1);
        assert!(summary.cancelled);
        assert!(summary.duration_secs < 3600.0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = poll(options(1, None), &cancel, |_| async { Ok(1) }).await;
        assert_eq!(summary.iterations, 0);
        assert!(summary.cancelled);
        assert!(summary.average_per_iteration.abs() < f64::EPSILON);
    }
}
