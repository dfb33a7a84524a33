//! Incremental sync driver: one bounded step from the current checkpoint.

use anyhow::{bail, Result};
use convoetl_types::SourceKey;

use crate::errors::SyncError;
use crate::retry::RetryPolicy;
use crate::step::{BatchStep, StepOutcome};

/// Default message limit for one incremental sync.
pub const DEFAULT_SYNC_LIMIT: usize = 5000;

/// Validated incremental sync parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SYNC_LIMIT,
        }
    }
}

impl SyncOptions {
    /// # Errors
    ///
    /// Returns an error if `limit` is zero.
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            bail!("sync limit must be at least 1");
        }
        Ok(Self { limit })
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Outcome of an incremental sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementalReport {
    pub new_messages: u64,
    /// Checkpoint after the sync (unchanged when nothing new arrived).
    pub last_message_id: Option<i64>,
}

/// Run exactly one step after `checkpoint` (absent ⇒ 0). Processes at most
/// `limit` messages; callers wanting more invoke again.
///
/// # Errors
///
/// Returns the step's error once `retry` gives up.
pub async fn run_incremental(
    step: &BatchStep,
    retry: &RetryPolicy,
    key: &SourceKey,
    checkpoint: Option<i64>,
    options: SyncOptions,
) -> Result<IncrementalReport, SyncError> {
    let after_id = checkpoint.unwrap_or(0);
    let limit = options.limit();

    let outcome = retry
        .run("incremental_batch", |_| step.execute(key, after_id, limit))
        .await?;

    let report = match outcome {
        StepOutcome::Exhausted => IncrementalReport {
            new_messages: 0,
            last_message_id: checkpoint,
        },
        StepOutcome::Stored(batch) => IncrementalReport {
            new_messages: batch.count_stored,
            last_message_id: Some(batch.max_id),
        },
    };

    tracing::info!(
        source = key.source_id.as_str(),
        platform = key.platform.as_str(),
        after_id,
        limit,
        new_messages = report.new_messages,
        last_message_id = report.last_message_id,
        "Incremental sync finished"
    );
    Ok(report)
}
