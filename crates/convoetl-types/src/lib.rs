//! Shared ConvoETL message, checkpoint, run and error model types.
//!
//! This crate performs no I/O so both the state backend and the engine can
//! depend on it.

pub mod error;
pub mod message;
pub mod state;

pub use error::{BackoffClass, ConnectorError, ErrorCategory};
pub use message::Message;
pub use state::{
    Checkpoint, Platform, RunMode, RunRecord, RunStats, RunStatus, SourceId, SourceKey,
    StoreStatistics, SyncMode,
};
