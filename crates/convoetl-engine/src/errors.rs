//! Sync error model and conversions from collaborator failures.

use convoetl_state::StateError;
use convoetl_types::{ConnectorError, SourceKey};

// ---------------------------------------------------------------------------
// SyncError: categorised errors for retry decisions
// ---------------------------------------------------------------------------

/// Categorized sync error for retry decisions.
///
/// `Connector` wraps a typed `ConnectorError` from the extractor or store,
/// carrying retry metadata (`retryable`, `backoff_class`, `retry_after_ms`).
///
/// `Regression` is an invariant violation: something attempted to move a
/// checkpoint backwards. It aborts the batch and is never retried.
///
/// `Infrastructure` wraps opaque host-side errors (task panics, invalid
/// options, configuration) that are never retried.
#[derive(Debug)]
pub enum SyncError {
    /// Typed extractor/store error with retry metadata.
    Connector(ConnectorError),
    /// Checkpoint regression (invariant violation).
    Regression {
        key: SourceKey,
        current: i64,
        attempted: i64,
    },
    /// Infrastructure error (task join, configuration, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connector(e) => write!(f, "{e}"),
            Self::Regression {
                key,
                current,
                attempted,
            } => write!(
                f,
                "checkpoint regression for {key}: current {current}, attempted {attempted}"
            ),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<ConnectorError> for SyncError {
    fn from(e: ConnectorError) -> Self {
        Self::Connector(e)
    }
}

impl From<StateError> for SyncError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::CheckpointRegression {
                key,
                current,
                attempted,
            } => Self::Regression {
                key,
                current,
                attempted,
            },
            StateError::LockPoisoned => Self::Connector(ConnectorError::internal(
                "STATE_LOCK_POISONED",
                e.to_string(),
            )),
            StateError::Corrupt(_) => {
                Self::Connector(ConnectorError::internal("STATE_CORRUPT", e.to_string()))
            }
            StateError::RunNotOpen(_) => {
                Self::Connector(ConnectorError::internal("RUN_NOT_OPEN", e.to_string()))
            }
            other if other.is_transient() => Self::Connector(ConnectorError::transient_store(
                "STORE_FAILURE",
                other.to_string(),
            )),
            other => Self::Connector(ConnectorError::internal("STORE_ERROR", other.to_string())),
        }
    }
}

impl SyncError {
    /// Returns `true` if this is a typed connector error that the
    /// collaborator marked as retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connector(e) => e.retryable,
            Self::Regression { .. } | Self::Infrastructure(_) => false,
        }
    }

    /// Returns the typed connector error if this is a `Connector` variant.
    #[must_use]
    pub fn as_connector_error(&self) -> Option<&ConnectorError> {
        match self {
            Self::Connector(e) => Some(e),
            Self::Regression { .. } | Self::Infrastructure(_) => None,
        }
    }

    /// Short classification label for logs and results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connector(e) if e.retryable => "transient",
            Self::Connector(_) => "fatal",
            Self::Regression { .. } => "invariant",
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}

/// Run a blocking state call on the blocking pool and map both the join
/// failure and the state error into a [`SyncError`].
pub(crate) async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StateError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Infrastructure(anyhow::anyhow!("{op} task panicked: {e}")))?
        .map_err(SyncError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoetl_types::ErrorCategory;

    #[test]
    fn connector_transient_is_retryable() {
        let err = SyncError::Connector(ConnectorError::transient_network(
            "CONN_RESET",
            "connection reset by peer",
        ));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "transient");
        let ce = err.as_connector_error().unwrap();
        assert_eq!(ce.category, ErrorCategory::TransientNetwork);
    }

    #[test]
    fn connector_not_found_is_fatal() {
        let err = SyncError::from(ConnectorError::not_found("UNKNOWN_SOURCE", "no chat 42"));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "fatal");
    }

    #[test]
    fn infrastructure_not_retryable() {
        let err: SyncError = anyhow::anyhow!("task panicked").into();
        assert!(matches!(err, SyncError::Infrastructure(_)));
        assert!(!err.is_retryable());
        assert!(err.as_connector_error().is_none());
    }

    #[test]
    fn state_regression_maps_to_invariant_error() {
        let err = SyncError::from(StateError::CheckpointRegression {
            key: SourceKey::new("42", "telegram"),
            current: 2500,
            attempted: 10,
        });
        assert!(matches!(
            err,
            SyncError::Regression {
                current: 2500,
                attempted: 10,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "invariant");
        assert!(err.to_string().contains("telegram/42"));
    }

    #[test]
    fn state_io_maps_to_transient_store() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SyncError::from(StateError::Io(io));
        assert!(err.is_retryable());
        let ce = err.as_connector_error().unwrap();
        assert_eq!(ce.category, ErrorCategory::TransientStore);
    }

    #[test]
    fn busy_sqlite_is_transient_store() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        let err = SyncError::from(StateError::Sqlite(busy));
        assert!(err.is_retryable());
        let ce = err.as_connector_error().unwrap();
        assert_eq!(ce.code, "STORE_FAILURE");
        assert_eq!(ce.category, ErrorCategory::TransientStore);
    }

    #[test]
    fn constraint_sqlite_is_fatal() {
        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("NOT NULL constraint failed: messages.text".into()),
        );
        let err = SyncError::from(StateError::Sqlite(constraint));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "fatal");
        assert_eq!(err.as_connector_error().unwrap().code, "STORE_ERROR");
    }

    #[test]
    fn sqlite_without_error_code_is_fatal() {
        let err = SyncError::from(StateError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        assert!(!err.is_retryable());
    }

    #[test]
    fn state_corruption_is_fatal() {
        let err = SyncError::from(StateError::Corrupt("bad mode".into()));
        assert!(!err.is_retryable());
        assert_eq!(err.as_connector_error().unwrap().code, "STATE_CORRUPT");
    }

    #[test]
    fn display_connector() {
        let err = SyncError::Connector(ConnectorError::rate_limit(
            "FLOOD_WAIT",
            "slow down",
            Some(5000),
        ));
        let msg = err.to_string();
        assert!(msg.contains("rate_limit"));
        assert!(msg.contains("FLOOD_WAIT"));
    }

    #[tokio::test]
    async fn blocking_maps_state_errors() {
        let err = blocking("load_checkpoint", || -> Result<(), StateError> {
            Err(StateError::LockPoisoned)
        })
        .await
        .unwrap_err();
        assert_eq!(err.as_connector_error().unwrap().code, "STATE_LOCK_POISONED");

        let ok = blocking("load_checkpoint", || Ok::<_, StateError>(7)).await.unwrap();
        assert_eq!(ok, 7);
    }
}
