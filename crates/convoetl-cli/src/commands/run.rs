use std::path::Path;

use anyhow::Result;
use convoetl_types::RunMode;

/// Execute the `run` command: backfill or sync depending on `mode` and the
/// stored checkpoint.
pub async fn execute(
    config_path: &Path,
    source: &str,
    platform: Option<&str>,
    mode: RunMode,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let key = config.source_key(source, platform)?;

    let result = pipeline.run(&key, mode).await;
    super::report(&result)
}
