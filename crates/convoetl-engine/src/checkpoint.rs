//! Checkpoint access: the per-source high-water mark.

use std::sync::Arc;

use convoetl_state::StateBackend;
use convoetl_types::SourceKey;

use crate::errors::{blocking, SyncError};

/// Async reader/writer for checkpoints held by a [`StateBackend`].
///
/// The monotonic guard lives in the backend, so an attempted regression
/// surfaces here as [`SyncError::Regression`] and leaves the stored value
/// untouched.
#[derive(Clone)]
pub struct CheckpointAccessor {
    state: Arc<dyn StateBackend>,
}

impl CheckpointAccessor {
    #[must_use]
    pub fn new(state: Arc<dyn StateBackend>) -> Self {
        Self { state }
    }

    /// Last processed message id, or `None` before the first batch.
    ///
    /// # Errors
    ///
    /// Returns a transient store error if the backend read fails.
    pub async fn get(&self, key: &SourceKey) -> Result<Option<i64>, SyncError> {
        let state = self.state.clone();
        let key = key.clone();
        let checkpoint =
            blocking("get_checkpoint", move || state.get_checkpoint(&key)).await?;
        Ok(checkpoint.map(|cp| cp.last_message_id))
    }

    /// Raise the checkpoint to `new_last_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Regression`] if `new_last_id` is below the
    /// stored value, or a transient store error on backend failure.
    pub async fn advance(&self, key: &SourceKey, new_last_id: i64) -> Result<(), SyncError> {
        let state = self.state.clone();
        let key_for_write = key.clone();
        blocking("advance_checkpoint", move || {
            state.advance_checkpoint(&key_for_write, new_last_id)
        })
        .await?;
        tracing::debug!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            last_message_id = new_last_id,
            "Checkpoint advanced"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoetl_state::SqliteStateBackend;

    fn accessor() -> CheckpointAccessor {
        CheckpointAccessor::new(Arc::new(SqliteStateBackend::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn absent_until_first_advance() {
        let cp = accessor();
        let key = SourceKey::new("42", "telegram");
        assert_eq!(cp.get(&key).await.unwrap(), None);

        cp.advance(&key, 1000).await.unwrap();
        assert_eq!(cp.get(&key).await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn regression_is_rejected_and_value_kept() {
        let cp = accessor();
        let key = SourceKey::new("42", "telegram");
        cp.advance(&key, 2500).await.unwrap();

        let err = cp.advance(&key, 100).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Regression {
                current: 2500,
                attempted: 100,
                ..
            }
        ));
        assert_eq!(cp.get(&key).await.unwrap(), Some(2500));
    }

    #[tokio::test]
    async fn sources_do_not_share_checkpoints() {
        let cp = accessor();
        let a = SourceKey::new("a", "telegram");
        let b = SourceKey::new("b", "telegram");
        cp.advance(&a, 50).await.unwrap();
        assert_eq!(cp.get(&b).await.unwrap(), None);
    }
}
