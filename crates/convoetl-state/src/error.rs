//! State backend error types.

use convoetl_types::SourceKey;

/// Errors produced by [`StateBackend`](crate::StateBackend) and
/// [`MessageStore`](crate::MessageStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure annotated with the operation that raised it.
    #[error("{context}: {source}")]
    SqliteContext {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,

    /// Attempt to move a checkpoint below its stored value.
    #[error("checkpoint regression for {key}: current {current}, attempted {attempted}")]
    CheckpointRegression {
        key: SourceKey,
        current: i64,
        attempted: i64,
    },

    /// `complete_run` targeted a run that is unknown or already finalized.
    #[error("run {0} is not open")]
    RunNotOpen(i64),

    /// A stored row could not be decoded into the model types.
    #[error("corrupt state row: {0}")]
    Corrupt(String),
}

impl StateError {
    /// Wrap a `SQLite` error with the failing operation's name.
    pub(crate) fn backend_context(context: &'static str, source: rusqlite::Error) -> Self {
        Self::SqliteContext { context, source }
    }

    /// Whether retrying the same call may succeed (lock contention, busy
    /// database, file-system hiccups).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(e) | Self::SqliteContext { source: e, .. } => matches!(
                e.sqlite_error_code(),
                Some(
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::SystemIoFailure
                )
            ),
            Self::Io(_) => true,
            Self::LockPoisoned
            | Self::CheckpointRegression { .. }
            | Self::RunNotOpen(_)
            | Self::Corrupt(_) => false,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StateError::backend_context("store_messages: prepare", inner);
        let msg = err.to_string();
        assert!(msg.contains("store_messages"), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = StateError::LockPoisoned;
        assert_eq!(err.to_string(), "state backend lock poisoned");
        assert!(!err.is_transient());
    }

    #[test]
    fn busy_database_is_transient() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(StateError::Sqlite(inner).is_transient());
    }

    #[test]
    fn regression_names_both_values() {
        let err = StateError::CheckpointRegression {
            key: SourceKey::new("42", "telegram"),
            current: 2500,
            attempted: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("telegram/42"));
        assert!(msg.contains("2500"));
        assert!(msg.contains("100"));
        assert!(!err.is_transient());
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StateError::Io(inner);
        assert!(err.to_string().contains("i/o"));
        assert!(err.is_transient());
    }
}
