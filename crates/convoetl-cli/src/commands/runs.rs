use std::path::Path;

use anyhow::Result;

/// Execute the `runs` command: recent run history, newest first.
pub async fn execute(
    config_path: &Path,
    source: Option<&str>,
    platform: Option<&str>,
    limit: usize,
) -> Result<()> {
    let (config, pipeline) = super::load(config_path)?;
    let key = source.map(|s| config.source_key(s, platform)).transpose()?;

    let runs = pipeline.recent_runs(key, limit).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
    }
    for run in &runs {
        let ids = match (run.start_message_id, run.end_message_id) {
            (Some(start), Some(end)) => format!("{start}..{end}"),
            (None, Some(end)) => format!("..{end}"),
            _ => "-".to_string(),
        };
        println!(
            "#{:<6} {:<28} {:<12} {:<10} {:>8} msgs  ids {:<16} {}",
            run.run_id,
            format!("{}/{}", run.platform, run.source_id),
            run.mode.as_str(),
            run.status.as_str(),
            run.messages_processed,
            ids,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if let Some(error) = &run.error {
            println!("        {error}");
        }
    }
    super::print_json(&runs)
}
