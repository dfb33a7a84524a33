//! Storage contracts consumed by the engine.
//!
//! [`StateBackend`] owns checkpoints and run history; [`MessageStore`] is the
//! append-only message sink. Model types live in [`convoetl_types`].

use convoetl_types::{
    Checkpoint, Message, RunRecord, RunStats, RunStatus, SourceKey, StoreStatistics, SyncMode,
};

use crate::error;

/// Storage contract for checkpoints and run history.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateBackend>`.
pub trait StateBackend: Send + Sync {
    /// Read the checkpoint for a `(source, platform)` pair.
    ///
    /// Returns `Ok(None)` when no batch has ever been committed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_checkpoint(&self, key: &SourceKey) -> error::Result<Option<Checkpoint>>;

    /// Create or raise the checkpoint to `last_message_id`.
    ///
    /// Writing the current value again is allowed. Writing a lower value
    /// leaves the stored row untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::CheckpointRegression`](crate::error::StateError::CheckpointRegression)
    /// when `last_message_id` is below the stored value, or another
    /// [`StateError`](crate::error::StateError) on storage failure.
    fn advance_checkpoint(&self, key: &SourceKey, last_message_id: i64) -> error::Result<()>;

    /// Open a run record in `running` state, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(
        &self,
        key: &SourceKey,
        mode: SyncMode,
        start_message_id: Option<i64>,
    ) -> error::Result<i64>;

    /// Finalize an open run. Finalized runs are never modified again.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::RunNotOpen`](crate::error::StateError::RunNotOpen)
    /// if the run is unknown or already finalized.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;

    /// Most recent runs first, optionally filtered to one source.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn recent_runs(&self, key: Option<&SourceKey>, limit: usize) -> error::Result<Vec<RunRecord>>;
}

/// Append-only message sink.
pub trait MessageStore: Send + Sync {
    /// Persist a batch. Rows whose `(message_id, source_id, platform)` already
    /// exist are skipped, so resubmitting an overlapping range is harmless.
    /// Returns the number of newly inserted rows.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure;
    /// the batch is written atomically, so a failure stores nothing.
    fn store(&self, messages: &[Message]) -> error::Result<u64>;

    /// Highest stored `message_id` for a source.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_last_id(&self, key: &SourceKey) -> error::Result<Option<i64>>;

    /// Aggregate counts, optionally filtered to one source.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn statistics(&self, key: Option<&SourceKey>) -> error::Result<StoreStatistics>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify both traits are object-safe (usable as `dyn`).
    #[test]
    fn traits_are_object_safe() {
        fn _assert_state(_: &dyn StateBackend) {}
        fn _assert_store(_: &dyn MessageStore) {}
    }
}
