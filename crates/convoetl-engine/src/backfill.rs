//! Backfill driver: batch loop from the checkpoint until the source is drained.

use anyhow::{bail, Result};
use convoetl_types::SourceKey;

use crate::errors::SyncError;
use crate::retry::RetryPolicy;
use crate::step::{BatchStep, StepOutcome};

/// Default page size for backfill batches.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Validated backfill parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    batch_size: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BackfillOptions {
    /// # Errors
    ///
    /// Returns an error if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("backfill batch_size must be at least 1");
        }
        Ok(Self { batch_size })
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Backfill driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillState {
    Running,
    /// Terminal success: the last batch came back short or empty.
    Exhausted,
    /// Terminal failure: a batch failed fatally or ran out of retries.
    Failed,
}

impl BackfillState {
    /// Transition after a successful step. A full batch means more data is
    /// likely to remain.
    #[must_use]
    pub fn after_step(outcome: &StepOutcome, batch_size: usize) -> Self {
        match outcome {
            StepOutcome::Exhausted => Self::Exhausted,
            StepOutcome::Stored(batch) if batch.batch_size_returned >= batch_size => Self::Running,
            StepOutcome::Stored(_) => Self::Exhausted,
        }
    }
}

/// Outcome of a backfill loop.
#[derive(Debug)]
pub struct BackfillReport {
    pub state: BackfillState,
    pub total_messages: u64,
    pub batches: u32,
    /// Checkpoint after the loop: the last advanced id, or the starting
    /// checkpoint if nothing was committed.
    pub last_message_id: Option<i64>,
    pub error: Option<SyncError>,
}

/// Run batches sequentially starting after `checkpoint` (absent ⇒ 0).
///
/// Each batch runs under `retry`. A failed batch ends the loop in
/// [`BackfillState::Failed`]; checkpoints from earlier batches stay as they
/// were committed.
pub async fn run_backfill(
    step: &BatchStep,
    retry: &RetryPolicy,
    key: &SourceKey,
    checkpoint: Option<i64>,
    options: BackfillOptions,
) -> BackfillReport {
    let batch_size = options.batch_size();
    let mut report = BackfillReport {
        state: BackfillState::Running,
        total_messages: 0,
        batches: 0,
        last_message_id: checkpoint,
        error: None,
    };
    let mut after_id = checkpoint.unwrap_or(0);

    tracing::info!(
        source = key.source_id.as_str(),
        platform = key.platform.as_str(),
        after_id,
        batch_size,
        "Starting backfill"
    );

    while report.state == BackfillState::Running {
        report.batches += 1;
        let outcome = retry
            .run("backfill_batch", |_| step.execute(key, after_id, batch_size))
            .await;

        match outcome {
            Ok(outcome) => {
                report.state = BackfillState::after_step(&outcome, batch_size);
                if let StepOutcome::Stored(batch) = outcome {
                    report.total_messages += batch.count_stored;
                    report.last_message_id = Some(batch.max_id);
                    after_id = batch.max_id;
                    if report.state == BackfillState::Exhausted {
                        tracing::info!(
                            source = key.source_id.as_str(),
                            returned = batch.batch_size_returned,
                            requested = batch_size,
                            "Short batch, treating source as exhausted"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    source = key.source_id.as_str(),
                    platform = key.platform.as_str(),
                    batch = report.batches,
                    after_id,
                    kind = err.kind(),
                    "Backfill batch failed: {}",
                    err
                );
                report.state = BackfillState::Failed;
                report.error = Some(err);
            }
        }
    }

    tracing::info!(
        source = key.source_id.as_str(),
        platform = key.platform.as_str(),
        state = ?report.state,
        batches = report.batches,
        total_messages = report.total_messages,
        last_message_id = report.last_message_id,
        "Backfill finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::BatchOutcome;

    fn stored(returned: usize) -> StepOutcome {
        StepOutcome::Stored(BatchOutcome {
            count_stored: returned as u64,
            max_id: 1,
            batch_size_returned: returned,
        })
    }

    #[test]
    fn options_reject_zero_batch() {
        assert!(BackfillOptions::new(0).is_err());
        assert_eq!(BackfillOptions::new(5).unwrap().batch_size(), 5);
        assert_eq!(BackfillOptions::default().batch_size(), 1000);
    }

    #[test]
    fn full_batch_keeps_running() {
        assert_eq!(
            BackfillState::after_step(&stored(1000), 1000),
            BackfillState::Running
        );
    }

    #[test]
    fn short_or_empty_batch_exhausts() {
        assert_eq!(
            BackfillState::after_step(&stored(500), 1000),
            BackfillState::Exhausted
        );
        assert_eq!(
            BackfillState::after_step(&StepOutcome::Exhausted, 1000),
            BackfillState::Exhausted
        );
    }
}
