//! Pipeline YAML configuration model and conversion into driver options.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use convoetl_types::{Platform, SourceKey};
use serde::Deserialize;

use crate::backfill::{BackfillOptions, DEFAULT_BATCH_SIZE};
use crate::coordinator::{CoordinatorOptions, DEFAULT_MAX_SOURCES};
use crate::incremental::{SyncOptions, DEFAULT_SYNC_LIMIT};
use crate::polling::PollOptions;
use crate::retry::{Backoff, RetryPolicy};

fn default_platform() -> String {
    "telegram".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/convoetl.db")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sync_limit() -> usize {
    DEFAULT_SYNC_LIMIT
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_seconds() -> u64 {
    60
}

fn default_max_delay_seconds() -> u64 {
    600
}

fn default_max_sources() -> usize {
    DEFAULT_MAX_SOURCES
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub version: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Extractor implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Newline-delimited JSON exports, one file per source.
    Ndjson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    /// Export directory for `ndjson`.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_limit")]
    pub limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limit: default_sync_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_seconds: default_delay_seconds(),
            backoff: Backoff::default(),
            max_delay_seconds: default_max_delay_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
        }
    }
}

/// One configured source. `platform` overrides the pipeline default.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub platform: Option<String>,
}

impl SourceConfig {
    /// Key of this entry: its own platform, or `default_platform`.
    #[must_use]
    pub fn key(&self, default_platform: &str) -> SourceKey {
        let platform = self.platform.as_deref().unwrap_or(default_platform);
        SourceKey::new(self.id.as_str(), platform)
    }
}

impl PipelineConfig {
    /// Resolve `source_id` to a key.
    ///
    /// An explicit `platform` wins. Otherwise the platform comes from the
    /// `sources` entries with that id, or the pipeline default when none
    /// match.
    ///
    /// # Errors
    ///
    /// Returns an error if `platform` is absent and the id is configured on
    /// more than one platform.
    pub fn source_key(&self, source_id: &str, platform: Option<&str>) -> Result<SourceKey> {
        if let Some(platform) = platform {
            return Ok(SourceKey::new(source_id, platform));
        }
        let mut matches: Vec<SourceKey> = Vec::new();
        for key in self.source_keys() {
            if key.source_id.as_str() == source_id && !matches.contains(&key) {
                matches.push(key);
            }
        }
        match matches.len() {
            0 => Ok(SourceKey::new(source_id, self.platform.as_str())),
            1 => Ok(matches.remove(0)),
            _ => {
                let platforms: Vec<&str> = matches.iter().map(|k| k.platform.as_str()).collect();
                bail!(
                    "Source '{source_id}' is configured on several platforms ({}); pass a platform",
                    platforms.join(", ")
                )
            }
        }
    }

    /// Keys for every configured source, in file order.
    #[must_use]
    pub fn source_keys(&self) -> Vec<SourceKey> {
        self.sources.iter().map(|s| s.key(&self.platform)).collect()
    }

    /// Distinct platforms referenced by this config, default first.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms = vec![Platform::new(self.platform.clone())];
        for source in &self.sources {
            if let Some(p) = &source.platform {
                let p = Platform::new(p.clone());
                if !platforms.contains(&p) {
                    platforms.push(p);
                }
            }
        }
        platforms
    }

    /// # Errors
    ///
    /// Returns an error if the retry settings are inconsistent.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.delay_seconds),
            self.retry.backoff,
            Duration::from_secs(self.retry.max_delay_seconds),
        )
    }

    /// # Errors
    ///
    /// Returns an error if `backfill.batch_size` is zero.
    pub fn backfill_options(&self) -> Result<BackfillOptions> {
        BackfillOptions::new(self.backfill.batch_size)
    }

    /// # Errors
    ///
    /// Returns an error if `sync.limit` is zero.
    pub fn sync_options(&self) -> Result<SyncOptions> {
        SyncOptions::new(self.sync.limit)
    }

    /// # Errors
    ///
    /// Returns an error if the polling interval or iteration cap is zero.
    pub fn poll_options(&self) -> Result<PollOptions> {
        PollOptions::new(
            Duration::from_secs(self.polling.interval_seconds),
            self.polling.max_iterations,
        )
    }

    /// # Errors
    ///
    /// Returns an error if `concurrency.max_sources` is zero.
    pub fn coordinator_options(&self) -> Result<CoordinatorOptions> {
        CoordinatorOptions::new(self.concurrency.max_sources)
    }
}
