//! Multi-source coordinator: bounded fan-out of per-source drivers.

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Result};
use convoetl_types::{SourceKey, SyncMode};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::result::{MultiSourceResult, SyncResult, SyncStatus};

/// Default number of sources processed concurrently.
pub const DEFAULT_MAX_SOURCES: usize = 3;

/// Validated coordinator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    max_concurrency: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_SOURCES,
        }
    }
}

impl CoordinatorOptions {
    /// # Errors
    ///
    /// Returns an error if `max_concurrency` is zero.
    pub fn new(max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            bail!("concurrency max_sources must be at least 1");
        }
        Ok(Self { max_concurrency })
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

/// Run `driver` once per source with at most `max_concurrency` in flight.
///
/// Every source yields exactly one [`SyncResult`]: a driver failure or panic
/// is recorded for that source only and never cancels its siblings.
/// Cancellation is observed when a source is about to start; sources not yet
/// started are reported as [`SyncStatus::Cancelled`], running ones finish.
pub async fn run_sources<F, Fut>(
    sources: Vec<SourceKey>,
    mode: SyncMode,
    options: CoordinatorOptions,
    cancel: &CancellationToken,
    driver: F,
) -> MultiSourceResult
where
    F: Fn(SourceKey) -> Fut,
    Fut: Future<Output = SyncResult> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency()));
    let mut join_set: JoinSet<SyncResult> = JoinSet::new();

    tracing::info!(
        sources = sources.len(),
        mode = mode.as_str(),
        max_concurrency = options.max_concurrency(),
        "Starting multi-source run"
    );

    for key in sources {
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let work = driver(key.clone());

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return SyncResult::not_started(
                        &key,
                        mode,
                        SyncStatus::Failed,
                        Some(format!("Semaphore closed: {e}")),
                    );
                }
            };
            if cancel.is_cancelled() {
                tracing::info!(source = key.source_id.as_str(), "Skipping source: cancelled");
                return SyncResult::not_started(&key, mode, SyncStatus::Cancelled, None);
            }

            // Inner task so a panicking driver is reported against its source.
            match tokio::spawn(work).await {
                Ok(result) => result,
                Err(join_err) => SyncResult::not_started(
                    &key,
                    mode,
                    SyncStatus::Failed,
                    Some(format!("Source task panicked: {join_err}")),
                ),
            }
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => {
                if result.is_success() {
                    tracing::info!(
                        source = result.source.as_str(),
                        messages = result.messages,
                        "Source finished"
                    );
                } else {
                    tracing::warn!(
                        source = result.source.as_str(),
                        status = result.status.as_str(),
                        error = result.error.as_deref(),
                        "Source did not complete"
                    );
                }
                results.push(result);
            }
            Err(join_err) => {
                // The outer task never panics; only runtime shutdown lands here.
                tracing::error!("Coordinator task failed: {}", join_err);
            }
        }
    }

    let aggregate = MultiSourceResult::from_results(results);
    tracing::info!(
        sources_processed = aggregate.sources_processed,
        succeeded = aggregate.succeeded,
        failed = aggregate.failed,
        total_messages = aggregate.total_messages,
        "Multi-source run finished"
    );
    aggregate
}
