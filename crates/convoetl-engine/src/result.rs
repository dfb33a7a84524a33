//! Driver result types returned to callers and printed by the CLI.

use convoetl_types::{Platform, SourceId, SourceKey, SyncMode};
use serde::Serialize;

/// Terminal status of one driver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Failed,
    /// Skipped because cancellation arrived before the source started.
    Cancelled,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a backfill, sync or run invocation for one source.
///
/// `last_message_id` is the checkpoint after the invocation, including on
/// failure, so the next call resumes from it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub source: SourceId,
    pub platform: Platform,
    pub mode: SyncMode,
    pub status: SyncStatus,
    /// New messages stored by this invocation.
    pub messages: u64,
    /// Extractor calls made, including a final empty one.
    pub batches: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<i64>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    /// A result for a source that never started.
    #[must_use]
    pub fn not_started(
        key: &SourceKey,
        mode: SyncMode,
        status: SyncStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            source: key.source_id.clone(),
            platform: key.platform.clone(),
            mode,
            status,
            messages: 0,
            batches: 0,
            last_message_id: None,
            duration_secs: 0.0,
            run_id: None,
            error,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }
}

/// Aggregate statistics from a polling loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollSummary {
    pub iterations: u32,
    pub failed_iterations: u32,
    pub total_messages: u64,
    pub average_per_iteration: f64,
    pub duration_secs: f64,
    /// True when the loop stopped on external cancellation.
    pub cancelled: bool,
}

/// Aggregate over a multi-source run. One entry in `results` per input
/// source; order is not significant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiSourceResult {
    pub sources_processed: usize,
    pub total_messages: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
}

impl MultiSourceResult {
    #[must_use]
    pub fn from_results(results: Vec<SyncResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results
            .iter()
            .filter(|r| r.status == SyncStatus::Failed)
            .count();
        Self {
            sources_processed: results.len(),
            total_messages: results.iter().map(|r| r.messages).sum(),
            succeeded,
            failed,
            results,
        }
    }
}
