//! State model types.
//!
//! Pure data types shared by `StateBackend` implementations and the engine.
//! Kept in the types crate so both the state and engine crates can share
//! them without circular dependencies.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque source identifier (group id, channel id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new source identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for SourceId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Platform name (e.g. `"telegram"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Create a new platform name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for Platform {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// The `(source, platform)` pair every checkpoint and run is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub source_id: SourceId,
    pub platform: Platform,
}

impl SourceKey {
    #[must_use]
    pub fn new(source_id: impl Into<SourceId>, platform: impl Into<Platform>) -> Self {
        Self {
            source_id: source_id.into(),
            platform: platform.into(),
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.platform, self.source_id)
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// High-water mark for a `(source, platform)` pair.
///
/// `updated_at` is an ISO-8601 UTC string. Backends handle timestamp
/// formatting internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_id: SourceId,
    pub platform: Platform,
    pub last_message_id: i64,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Concrete driver kind a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Backfill,
    Incremental,
}

impl SyncMode {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backfill" => Ok(Self::Backfill),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!(
                "unknown sync mode '{other}', expected 'backfill' or 'incremental'"
            )),
        }
    }
}

/// Mode requested by a caller of `run`: either an explicit driver or
/// `auto`, which picks one from checkpoint presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Auto,
    Backfill,
    Incremental,
}

impl RunMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Backfill => "backfill",
            Self::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "backfill" => Ok(Self::Backfill),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!(
                "unknown run mode '{other}', expected 'auto', 'backfill' or 'incremental'"
            )),
        }
    }
}

impl From<SyncMode> for RunMode {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Backfill => Self::Backfill,
            SyncMode::Incremental => Self::Incremental,
        }
    }
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the storage representation; unknown values map to `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics written when a run is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub messages_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_message_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub source_id: SourceId,
    pub platform: Platform,
    pub mode: SyncMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_message_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_message_id: Option<i64>,
    pub messages_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate counts over the message store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_messages: u64,
    pub total_authors: u64,
    pub total_sources: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_display_and_as_str() {
        let sid = SourceId::new("1670178185");
        assert_eq!(sid.as_str(), "1670178185");
        assert_eq!(sid.to_string(), "1670178185");
    }

    #[test]
    fn source_key_display() {
        let key = SourceKey::new("42", "telegram");
        assert_eq!(key.to_string(), "telegram/42");
    }

    #[test]
    fn source_key_eq_and_hash() {
        use std::collections::HashSet;
        let a = SourceKey::new("42", "telegram");
        let b = SourceKey::new("42", "telegram");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&SourceKey::new("42", "youtube")));
    }

    #[test]
    fn run_status_storage_strings() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("paused"), None);
    }

    #[test]
    fn run_mode_parses_cli_values() {
        assert_eq!("auto".parse::<RunMode>().unwrap(), RunMode::Auto);
        assert_eq!("backfill".parse::<RunMode>().unwrap(), RunMode::Backfill);
        assert!("sideways".parse::<RunMode>().is_err());
    }

    #[test]
    fn sync_mode_rejects_auto() {
        let err = "auto".parse::<SyncMode>().unwrap_err();
        assert!(err.contains("auto"));
    }

    #[test]
    fn run_mode_serde_snake_case() {
        let json = serde_json::to_string(&RunMode::Incremental).unwrap();
        assert_eq!(json, "\"incremental\"");
    }

    #[test]
    fn source_id_serde_transparent() {
        let sid = SourceId::new("42");
        assert_eq!(serde_json::to_string(&sid).unwrap(), "\"42\"");
    }
}
