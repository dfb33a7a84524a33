use std::path::Path;

use anyhow::Result;

/// Execute the `stats` command: store statistics, plus the checkpoint when
/// a source is given.
pub async fn execute(
    config_path: &Path,
    source: Option<&str>,
    platform: Option<&str>,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let key = source.map(|s| config.source_key(s, platform)).transpose()?;

    let stats = pipeline.statistics(key.clone()).await?;
    match &key {
        Some(key) => println!("Statistics for {key}:"),
        None => println!("Statistics for all sources:"),
    }
    println!("  Messages:         {}", stats.total_messages);
    println!("  Authors:          {}", stats.total_authors);
    println!("  Sources:          {}", stats.total_sources);
    if let Some(first) = &stats.first_message_at {
        println!("  First message:    {first}");
    }
    if let Some(last) = &stats.last_message_at {
        println!("  Last message:     {last}");
    }

    let checkpoint = match &key {
        Some(key) => pipeline.checkpoint(key).await?,
        None => None,
    };
    if key.is_some() {
        match checkpoint {
            Some(id) => println!("  Checkpoint:       {id}"),
            None => println!("  Checkpoint:       (none)"),
        }
    }

    super::print_json(&serde_json::json!({
        "statistics": stats,
        "checkpoint": checkpoint,
    }))
}
