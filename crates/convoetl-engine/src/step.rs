//! Batch extraction step: extract one page, store it, advance the checkpoint.

use std::sync::{Arc, Mutex, PoisonError};

use convoetl_state::MessageStore;
use convoetl_types::message::max_message_id;
use convoetl_types::{ConnectorError, SourceKey};

use crate::checkpoint::CheckpointAccessor;
use crate::errors::{blocking, SyncError};
use crate::extractor::Extractor;

/// Counts from one stored batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows newly inserted by the store (duplicates excluded).
    pub count_stored: u64,
    /// Highest `message_id` in the batch; the checkpoint now equals this.
    pub max_id: i64,
    /// Number of messages the extractor returned.
    pub batch_size_returned: usize,
}

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The extractor returned nothing; no side effects were performed.
    Exhausted,
    Stored(BatchOutcome),
}

/// Rows stored by an attempt whose checkpoint write then failed.
#[derive(Debug, Clone, Copy)]
struct Unadvanced {
    after_id: i64,
    count_stored: u64,
}

/// One unit of work over an extractor, a store and the checkpoint.
///
/// Side effects happen in a fixed order: store first, checkpoint last. A
/// failure anywhere before the checkpoint write leaves the checkpoint where
/// it was, so retrying the step re-delivers the same range and the store
/// skips what it already has. Rows committed by an attempt whose checkpoint
/// write failed are credited to the retry of the same range.
///
/// Create one step per driver invocation; clones share the carried count.
#[derive(Clone)]
pub struct BatchStep {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn MessageStore>,
    checkpoints: CheckpointAccessor,
    unadvanced: Arc<Mutex<Option<Unadvanced>>>,
}

impl BatchStep {
    #[must_use]
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn MessageStore>,
        checkpoints: CheckpointAccessor,
    ) -> Self {
        Self {
            extractor,
            store,
            checkpoints,
            unadvanced: Arc::new(Mutex::new(None)),
        }
    }

    /// Take the count carried over from a failed attempt at `after_id`.
    fn take_unadvanced(&self, after_id: i64) -> u64 {
        let mut slot = self.unadvanced.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.take() {
            Some(carried) if carried.after_id == after_id => carried.count_stored,
            _ => 0,
        }
    }

    fn set_unadvanced(&self, after_id: i64, count_stored: u64) {
        let mut slot = self.unadvanced.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Unadvanced {
            after_id,
            count_stored,
        });
    }

    /// Execute the step for `key` starting after `after_id`.
    ///
    /// # Errors
    ///
    /// Extractor errors pass through with their classification. Store
    /// failures are transient. Foreign messages in the batch are a fatal
    /// data error and a checkpoint regression is an invariant error.
    pub async fn execute(
        &self,
        key: &SourceKey,
        after_id: i64,
        limit: usize,
    ) -> Result<StepOutcome, SyncError> {
        tracing::debug!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            after_id,
            batch_size = limit,
            "Extracting batch"
        );

        let messages = self
            .extractor
            .extract(&key.source_id, after_id, limit)
            .await?;

        let Some(max_id) = max_message_id(&messages) else {
            return Ok(StepOutcome::Exhausted);
        };

        if let Some(foreign) = messages
            .iter()
            .find(|m| m.source_id != key.source_id || m.platform != key.platform)
        {
            return Err(ConnectorError::data(
                "FOREIGN_MESSAGE",
                format!(
                    "message {} belongs to {}/{}, expected {key}",
                    foreign.message_id, foreign.platform, foreign.source_id
                ),
            )
            .into());
        }

        let batch_size_returned = messages.len();
        let store = self.store.clone();
        let inserted = blocking("store_messages", move || store.store(&messages)).await?;
        let count_stored = inserted + self.take_unadvanced(after_id);

        if let Err(err) = self.checkpoints.advance(key, max_id).await {
            self.set_unadvanced(after_id, count_stored);
            return Err(err);
        }

        tracing::info!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            after_id,
            batch_size = limit,
            returned = batch_size_returned,
            stored = count_stored,
            max_id,
            "Batch committed"
        );

        Ok(StepOutcome::Stored(BatchOutcome {
            count_stored,
            max_id,
            batch_size_returned,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use convoetl_state::{SqliteStateBackend, StateBackend};
    use convoetl_types::{Message, Platform, SourceId};

    struct FixedExtractor {
        platform: Platform,
        batch: Vec<Message>,
    }

    #[async_trait]
    impl Extractor for FixedExtractor {
        fn platform(&self) -> &Platform {
            &self.platform
        }

        async fn extract(
            &self,
            _source_id: &SourceId,
            after_id: i64,
            limit: usize,
        ) -> Result<Vec<Message>, ConnectorError> {
            Ok(self
                .batch
                .iter()
                .filter(|m| m.message_id > after_id)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn msg(source: &str, id: i64) -> Message {
        Message {
            message_id: id,
            source_id: SourceId::new(source),
            platform: Platform::new("telegram"),
            author_id: 1,
            text: String::new(),
            timestamp: Utc::now(),
            reply_to_id: None,
            extracted_at: Utc::now(),
        }
    }

    fn step_over(batch: Vec<Message>) -> (BatchStep, Arc<SqliteStateBackend>) {
        let backend = Arc::new(SqliteStateBackend::in_memory().unwrap());
        let extractor = Arc::new(FixedExtractor {
            platform: Platform::new("telegram"),
            batch,
        });
        let step = BatchStep::new(
            extractor,
            backend.clone(),
            CheckpointAccessor::new(backend.clone()),
        );
        (step, backend)
    }

    #[tokio::test]
    async fn empty_batch_is_exhausted_without_side_effects() {
        let (step, backend) = step_over(vec![]);
        let key = SourceKey::new("42", "telegram");
        let outcome = step.execute(&key, 0, 100).await.unwrap();
        assert_eq!(outcome, StepOutcome::Exhausted);
        assert!(backend.get_checkpoint(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn stores_then_advances_to_max_id() {
        let (step, backend) = step_over(vec![msg("42", 3), msg("42", 1), msg("42", 2)]);
        let key = SourceKey::new("42", "telegram");
        let outcome = step.execute(&key, 0, 100).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Stored(BatchOutcome {
                count_stored: 3,
                max_id: 3,
                batch_size_returned: 3,
            })
        );
        assert_eq!(
            backend.get_checkpoint(&key).unwrap().unwrap().last_message_id,
            3
        );
        assert_eq!(backend.get_last_id(&key).unwrap(), Some(3));
    }

    #[tokio::test]
    async fn foreign_message_is_rejected_before_storing() {
        let (step, backend) = step_over(vec![msg("42", 1), msg("99", 2)]);
        let key = SourceKey::new("42", "telegram");
        let err = step.execute(&key, 0, 100).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.as_connector_error().unwrap().code, "FOREIGN_MESSAGE");
        assert_eq!(backend.get_last_id(&key).unwrap(), None);
        assert!(backend.get_checkpoint(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_batch_raises_regression() {
        let (step, backend) = step_over(vec![msg("42", 1), msg("42", 2)]);
        let key = SourceKey::new("42", "telegram");
        backend.advance_checkpoint(&key, 50).unwrap();

        // after_id below the checkpoint makes the extractor hand back old ids.
        let err = step.execute(&key, 0, 100).await.unwrap_err();
        assert!(matches!(err, SyncError::Regression { current: 50, .. }));
        assert_eq!(
            backend.get_checkpoint(&key).unwrap().unwrap().last_message_id,
            50
        );
    }
}
