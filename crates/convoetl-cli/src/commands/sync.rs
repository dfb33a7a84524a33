use std::path::Path;

use anyhow::Result;
use convoetl_engine::SyncOptions;

/// Execute the `sync` command: one incremental step.
pub async fn execute(
    config_path: &Path,
    source: &str,
    platform: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let options = match limit {
        Some(n) => SyncOptions::new(n)?,
        None => pipeline.sync_options(),
    };
    let key = config.source_key(source, platform)?;

    let result = pipeline.sync(&key, options).await;
    super::report(&result)
}
