use std::path::Path;

use anyhow::Result;
use convoetl_engine::BackfillOptions;

/// Execute the `backfill` command.
pub async fn execute(
    config_path: &Path,
    source: &str,
    platform: Option<&str>,
    batch_size: Option<usize>,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let options = match batch_size {
        Some(n) => BackfillOptions::new(n)?,
        None => pipeline.backfill_options(),
    };
    let key = config.source_key(source, platform)?;

    tracing::info!(
        source = key.source_id.as_str(),
        platform = key.platform.as_str(),
        batch_size = options.batch_size(),
        "Starting backfill"
    );
    let result = pipeline.backfill(&key, options).await;
    super::report(&result)
}
