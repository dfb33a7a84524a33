pub mod backfill;
pub mod poll;
pub mod run;
pub mod run_multiple;
pub mod runs;
pub mod schedule;
pub mod stats;
pub mod sync;

use std::path::Path;

use anyhow::{bail, Context, Result};
use convoetl_engine::config::{parser, PipelineConfig};
use convoetl_engine::{Pipeline, SyncResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Parse the pipeline file and build a pipeline from it. Validation runs
/// inside `Pipeline::from_config`.
pub(crate) fn load(config_path: &Path) -> Result<(PipelineConfig, Pipeline)> {
    let config = parser::parse_pipeline(config_path)
        .with_context(|| format!("Failed to parse pipeline: {}", config_path.display()))?;
    let pipeline = Pipeline::from_config(&config)?;
    Ok((config, pipeline))
}

/// Token cancelled on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            token.cancel();
        }
    });
    cancel
}

/// Print `value` as a single JSON line for scripts.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}

/// Human-readable summary of one driver invocation, then its JSON line.
/// Fails the command when the invocation failed.
pub(crate) fn report(result: &SyncResult) -> Result<()> {
    println!(
        "{} of {}/{} {}.",
        capitalize(result.mode.as_str()),
        result.platform,
        result.source,
        result.status
    );
    println!("  Messages stored:  {}", result.messages);
    println!("  Batches:          {}", result.batches);
    match result.last_message_id {
        Some(id) => println!("  Checkpoint:       {id}"),
        None => println!("  Checkpoint:       (none)"),
    }
    println!("  Duration:         {:.2}s", result.duration_secs);
    if let Some(run_id) = result.run_id {
        println!("  Run id:           {run_id}");
    }
    if let Some(error) = &result.error {
        println!("  Error:            {error}");
    }
    print_json(result)?;

    if !result.is_success() {
        bail!("{} of {} failed", result.mode, result.source);
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
