//! Pipeline orchestrator: the driver entry points exposed to callers.
//!
//! [`Pipeline`] wires extractors, the message store and the state backend
//! together and wraps every driver invocation in a run record.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use convoetl_state::{MessageStore, SqliteStateBackend, StateBackend};
use convoetl_types::{
    ConnectorError, Platform, RunMode, RunRecord, RunStats, RunStatus, SourceId, SourceKey,
    StoreStatistics, SyncMode,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backfill::{run_backfill, BackfillOptions, BackfillState};
use crate::checkpoint::CheckpointAccessor;
use crate::config::types::{ExtractorKind, PipelineConfig};
use crate::config::validator::validate_pipeline;
use crate::coordinator::{run_sources, CoordinatorOptions};
use crate::errors::{blocking, SyncError};
use crate::extractor::Extractor;
use crate::incremental::{run_incremental, SyncOptions};
use crate::mode::select_mode;
use crate::ndjson::NdjsonExtractor;
use crate::polling::{poll, PollOptions};
use crate::result::{MultiSourceResult, PollSummary, SyncResult, SyncStatus};
use crate::retry::RetryPolicy;
use crate::step::BatchStep;

/// Outcome of one driver invocation before it is reported.
struct DriverOutcome {
    messages: u64,
    batches: u32,
    last_message_id: Option<i64>,
    error: Option<SyncError>,
}

/// Entry point for backfill, sync, poll, run and run-multiple.
///
/// Cheap to clone; all collaborators are shared behind `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    default_platform: Platform,
    extractors: Arc<HashMap<Platform, Arc<dyn Extractor>>>,
    state: Arc<dyn StateBackend>,
    store: Arc<dyn MessageStore>,
    checkpoints: CheckpointAccessor,
    retry: RetryPolicy,
    backfill: BackfillOptions,
    sync: SyncOptions,
    coordinator: CoordinatorOptions,
}

impl Pipeline {
    /// Build a pipeline whose default platform is `extractor.platform()`.
    #[must_use]
    pub fn new(
        extractor: Arc<dyn Extractor>,
        state: Arc<dyn StateBackend>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let default_platform = extractor.platform().clone();
        let mut extractors: HashMap<Platform, Arc<dyn Extractor>> = HashMap::new();
        extractors.insert(default_platform.clone(), extractor);
        Self {
            default_platform,
            extractors: Arc::new(extractors),
            checkpoints: CheckpointAccessor::new(state.clone()),
            state,
            store,
            retry: RetryPolicy::default(),
            backfill: BackfillOptions::default(),
            sync: SyncOptions::default(),
            coordinator: CoordinatorOptions::default(),
        }
    }

    /// Register an extractor for an additional platform.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        Arc::make_mut(&mut self.extractors).insert(extractor.platform().clone(), extractor);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_backfill_options(mut self, options: BackfillOptions) -> Self {
        self.backfill = options;
        self
    }

    #[must_use]
    pub fn with_sync_options(mut self, options: SyncOptions) -> Self {
        self.sync = options;
        self
    }

    #[must_use]
    pub fn with_coordinator_options(mut self, options: CoordinatorOptions) -> Self {
        self.coordinator = options;
        self
    }

    /// Build from a parsed config: opens the `SQLite` state file and one
    /// extractor per referenced platform. Exports for a non-default
    /// platform live under `<extractor.path>/<platform>/`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the state file can't be
    /// opened.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        validate_pipeline(config)?;

        let backend = Arc::new(SqliteStateBackend::open(&config.state.path).with_context(
            || format!("Failed to open state database: {}", config.state.path.display()),
        )?);

        let mut platforms = config.platforms().into_iter();
        let default_platform = platforms
            .next()
            .unwrap_or_else(|| Platform::new(config.platform.clone()));
        let make_extractor = |platform: Platform, is_default: bool| -> Arc<dyn Extractor> {
            let dir = if is_default {
                config.extractor.path.clone()
            } else {
                config.extractor.path.join(platform.as_str())
            };
            match config.extractor.kind {
                ExtractorKind::Ndjson => Arc::new(NdjsonExtractor::new(dir, platform)),
            }
        };

        let mut pipeline = Self::new(
            make_extractor(default_platform, true),
            backend.clone(),
            backend,
        );
        for platform in platforms {
            pipeline = pipeline.with_extractor(make_extractor(platform, false));
        }

        Ok(pipeline
            .with_retry(config.retry_policy()?)
            .with_backfill_options(config.backfill_options()?)
            .with_sync_options(config.sync_options()?)
            .with_coordinator_options(config.coordinator_options()?))
    }

    /// Key for `source_id` on the default platform.
    #[must_use]
    pub fn key(&self, source_id: impl Into<SourceId>) -> SourceKey {
        SourceKey::new(source_id, self.default_platform.clone())
    }

    #[must_use]
    pub fn default_platform(&self) -> &Platform {
        &self.default_platform
    }

    #[must_use]
    pub fn backfill_options(&self) -> BackfillOptions {
        self.backfill
    }

    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        self.sync
    }

    // -----------------------------------------------------------------------
    // Driver entry points
    // -----------------------------------------------------------------------

    /// Backfill `key` from its checkpoint until the source is drained.
    pub async fn backfill(&self, key: &SourceKey, options: BackfillOptions) -> SyncResult {
        let start = Instant::now();
        match self.read_checkpoint(key).await {
            Ok(checkpoint) => {
                self.invoke(key, SyncMode::Backfill, checkpoint, start, options, self.sync)
                    .await
            }
            Err(err) => Self::failed_before_start(key, SyncMode::Backfill, &err, start),
        }
    }

    /// Run one incremental step of at most `options.limit()` messages.
    pub async fn sync(&self, key: &SourceKey, options: SyncOptions) -> SyncResult {
        let start = Instant::now();
        match self.read_checkpoint(key).await {
            Ok(checkpoint) => {
                self.invoke(
                    key,
                    SyncMode::Incremental,
                    checkpoint,
                    start,
                    self.backfill,
                    options,
                )
                .await
            }
            Err(err) => Self::failed_before_start(key, SyncMode::Incremental, &err, start),
        }
    }

    /// Resolve `mode` against the checkpoint and run the chosen driver with
    /// the pipeline's default options.
    pub async fn run(&self, key: &SourceKey, mode: RunMode) -> SyncResult {
        let start = Instant::now();
        let checkpoint = match self.read_checkpoint(key).await {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                let fallback = select_mode(mode, None);
                return Self::failed_before_start(key, fallback, &err, start);
            }
        };
        let selected = select_mode(mode, checkpoint);
        tracing::info!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            requested = mode.as_str(),
            selected = selected.as_str(),
            checkpoint,
            "Mode selected"
        );
        self.invoke(key, selected, checkpoint, start, self.backfill, self.sync)
            .await
    }

    /// Repeat incremental syncs of `key` every `options.interval()` until
    /// the iteration cap or `cancel` fires.
    pub async fn poll(
        &self,
        key: &SourceKey,
        options: PollOptions,
        sync: SyncOptions,
        cancel: &CancellationToken,
    ) -> PollSummary {
        poll(options, cancel, |_| async move {
            let start = Instant::now();
            let checkpoint = self.read_checkpoint(key).await?;
            let outcome = self
                .drive(key, SyncMode::Incremental, checkpoint, self.backfill, sync)
                .await;
            let result = Self::finish(key, SyncMode::Incremental, checkpoint, start, outcome);
            match result {
                (_, Some(err)) => Err(err),
                (result, None) => Ok(result.messages),
            }
        })
        .await
    }

    /// Run `mode` for every source with bounded concurrency. Sources fail
    /// independently.
    pub async fn run_multiple(
        &self,
        sources: Vec<SourceKey>,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> MultiSourceResult {
        let this = self.clone();
        run_sources(sources, mode, self.coordinator, cancel, move |key| {
            let this = this.clone();
            async move { this.run(&key, RunMode::from(mode)).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // History and statistics
    // -----------------------------------------------------------------------

    /// Most recent run records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the state backend read fails.
    pub async fn recent_runs(
        &self,
        key: Option<SourceKey>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, SyncError> {
        let state = self.state.clone();
        blocking("recent_runs", move || state.recent_runs(key.as_ref(), limit)).await
    }

    /// Store-wide or per-source message statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn statistics(&self, key: Option<SourceKey>) -> Result<StoreStatistics, SyncError> {
        let store = self.store.clone();
        blocking("statistics", move || store.statistics(key.as_ref())).await
    }

    /// Current checkpoint of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state backend read fails.
    pub async fn checkpoint(&self, key: &SourceKey) -> Result<Option<i64>, SyncError> {
        self.checkpoints.get(key).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn read_checkpoint(&self, key: &SourceKey) -> Result<Option<i64>, SyncError> {
        self.retry
            .run("get_checkpoint", |_| self.checkpoints.get(key))
            .await
    }

    fn step_for(&self, key: &SourceKey) -> Result<BatchStep, SyncError> {
        let extractor = self.extractors.get(&key.platform).ok_or_else(|| {
            SyncError::Connector(ConnectorError::config(
                "NO_EXTRACTOR",
                format!("no extractor configured for platform '{}'", key.platform),
            ))
        })?;
        Ok(BatchStep::new(
            extractor.clone(),
            self.store.clone(),
            self.checkpoints.clone(),
        ))
    }

    async fn invoke(
        &self,
        key: &SourceKey,
        mode: SyncMode,
        checkpoint: Option<i64>,
        start: Instant,
        backfill: BackfillOptions,
        sync: SyncOptions,
    ) -> SyncResult {
        let outcome = self.drive(key, mode, checkpoint, backfill, sync).await;
        Self::finish(key, mode, checkpoint, start, outcome).0
    }

    /// Open a run record, run the driver and close the record.
    async fn drive(
        &self,
        key: &SourceKey,
        mode: SyncMode,
        checkpoint: Option<i64>,
        backfill: BackfillOptions,
        sync: SyncOptions,
    ) -> (Option<i64>, DriverOutcome) {
        let step = match self.step_for(key) {
            Ok(step) => step,
            Err(err) => return (None, DriverOutcome::failed(checkpoint, err)),
        };

        let run_id = match self.open_run(key, mode, checkpoint).await {
            Ok(run_id) => run_id,
            Err(err) => return (None, DriverOutcome::failed(checkpoint, err)),
        };

        let outcome = match mode {
            SyncMode::Backfill => {
                let report = run_backfill(&step, &self.retry, key, checkpoint, backfill).await;
                debug_assert!(report.state != BackfillState::Running);
                DriverOutcome {
                    messages: report.total_messages,
                    batches: report.batches,
                    last_message_id: report.last_message_id,
                    error: report.error,
                }
            }
            SyncMode::Incremental => {
                match run_incremental(&step, &self.retry, key, checkpoint, sync).await {
                    Ok(report) => DriverOutcome {
                        messages: report.new_messages,
                        batches: 1,
                        last_message_id: report.last_message_id,
                        error: None,
                    },
                    Err(err) => DriverOutcome {
                        messages: 0,
                        batches: 1,
                        last_message_id: checkpoint,
                        error: Some(err),
                    },
                }
            }
        };

        self.close_run(run_id, &outcome).await;
        (Some(run_id), outcome)
    }

    fn finish(
        key: &SourceKey,
        mode: SyncMode,
        checkpoint: Option<i64>,
        start: Instant,
        (run_id, outcome): (Option<i64>, DriverOutcome),
    ) -> (SyncResult, Option<SyncError>) {
        let status = if outcome.error.is_some() {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };
        let result = SyncResult {
            source: key.source_id.clone(),
            platform: key.platform.clone(),
            mode,
            status,
            messages: outcome.messages,
            batches: outcome.batches,
            last_message_id: outcome.last_message_id.or(checkpoint),
            duration_secs: start.elapsed().as_secs_f64(),
            run_id,
            error: outcome.error.as_ref().map(ToString::to_string),
        };
        tracing::info!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            mode = mode.as_str(),
            status = status.as_str(),
            messages = result.messages,
            batches = result.batches,
            last_message_id = result.last_message_id,
            duration_secs = result.duration_secs,
            "Driver finished"
        );
        (result, outcome.error)
    }

    async fn open_run(
        &self,
        key: &SourceKey,
        mode: SyncMode,
        checkpoint: Option<i64>,
    ) -> Result<i64, SyncError> {
        self.retry
            .run("start_run", |_| {
                let state = self.state.clone();
                let key = key.clone();
                blocking("start_run", move || state.start_run(&key, mode, checkpoint))
            })
            .await
    }

    /// Finalize the run record. The batches it describes are already
    /// committed, so a failure here is logged and not surfaced.
    async fn close_run(&self, run_id: i64, outcome: &DriverOutcome) {
        let status = if outcome.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let stats = RunStats {
            messages_processed: outcome.messages,
            end_message_id: outcome.last_message_id,
            error_message: outcome.error.as_ref().map(ToString::to_string),
        };
        let state = self.state.clone();
        if let Err(err) = blocking("complete_run", move || {
            state.complete_run(run_id, status, &stats)
        })
        .await
        {
            tracing::warn!(run_id, "Failed to finalize run record: {}", err);
        }
    }

    fn failed_before_start(
        key: &SourceKey,
        mode: SyncMode,
        err: &SyncError,
        start: Instant,
    ) -> SyncResult {
        tracing::error!(
            source = key.source_id.as_str(),
            platform = key.platform.as_str(),
            kind = err.kind(),
            "Could not read checkpoint: {}",
            err
        );
        SyncResult {
            duration_secs: start.elapsed().as_secs_f64(),
            ..SyncResult::not_started(key, mode, SyncStatus::Failed, Some(err.to_string()))
        }
    }
}

impl DriverOutcome {
    fn failed(checkpoint: Option<i64>, err: SyncError) -> Self {
        Self {
            messages: 0,
            batches: 0,
            last_message_id: checkpoint,
            error: Some(err),
        }
    }
}
