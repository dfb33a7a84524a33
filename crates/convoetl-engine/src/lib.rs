//! Extraction-load orchestration for ConvoETL: checkpointed backfill,
//! incremental sync, polling and multi-source fan-out.

pub mod backfill;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod extractor;
pub mod incremental;
pub mod mode;
pub mod ndjson;
pub mod orchestrator;
pub mod polling;
pub mod result;
pub mod retry;
pub mod step;

// Re-export public API for convenience
pub use backfill::{BackfillOptions, BackfillState};
pub use coordinator::CoordinatorOptions;
pub use errors::SyncError;
pub use extractor::Extractor;
pub use incremental::SyncOptions;
pub use ndjson::NdjsonExtractor;
pub use orchestrator::Pipeline;
pub use polling::PollOptions;
pub use result::{MultiSourceResult, PollSummary, SyncResult, SyncStatus};
pub use retry::{Backoff, RetryPolicy};
