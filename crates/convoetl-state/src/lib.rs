//! Durable state for the ConvoETL engine.
//!
//! Provides the [`StateBackend`] and [`MessageStore`] traits and a
//! [`SqliteStateBackend`] implementation covering checkpoints, run history
//! and the deduplicating message store.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::{MessageStore, StateBackend};
pub use error::StateError;
pub use sqlite::SqliteStateBackend;

/// Common imports for working with the state crate.
pub mod prelude {
    pub use crate::backend::{MessageStore, StateBackend};
    pub use crate::error::StateError;
    pub use crate::sqlite::SqliteStateBackend;
    pub use convoetl_types::{
        Checkpoint, Message, Platform, RunRecord, RunStats, RunStatus, SourceId, SourceKey,
        StoreStatistics, SyncMode,
    };
}
