use std::path::Path;

use anyhow::{bail, Result};
use convoetl_types::SyncMode;

/// Execute the `run-multiple` command over `sources`, or over every
/// configured source when none are given. `platform` narrows the configured
/// set, or resolves each given id.
pub async fn execute(
    config_path: &Path,
    sources: Vec<String>,
    platform: Option<&str>,
    mode: SyncMode,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let keys = if sources.is_empty() {
        config
            .source_keys()
            .into_iter()
            .filter(|key| platform.map_or(true, |p| key.platform.as_str() == p))
            .collect::<Vec<_>>()
    } else {
        sources
            .iter()
            .map(|s| config.source_key(s, platform))
            .collect::<Result<Vec<_>>>()?
    };
    if keys.is_empty() {
        bail!("No sources given and none configured in {}", config_path.display());
    }
    let cancel = super::cancel_on_ctrl_c();

    let summary = pipeline.run_multiple(keys, mode, &cancel).await;

    println!(
        "Processed {} source(s): {} succeeded, {} failed, {} messages stored.",
        summary.sources_processed, summary.succeeded, summary.failed, summary.total_messages
    );
    for result in &summary.results {
        let checkpoint = result
            .last_message_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        println!(
            "  {:<10} {:<24} {:<10} {:>8} msgs  checkpoint {}",
            result.platform.as_str(),
            result.source.as_str(),
            result.status.as_str(),
            result.messages,
            checkpoint
        );
        if let Some(error) = &result.error {
            println!("    {error}");
        }
    }
    super::print_json(&summary)?;

    if summary.failed > 0 {
        bail!("{} of {} source(s) failed", summary.failed, summary.sources_processed);
    }
    Ok(())
}
