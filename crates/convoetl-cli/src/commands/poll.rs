use std::path::Path;

use anyhow::Result;
use convoetl_engine::config::PipelineConfig;
use convoetl_engine::PollOptions;

/// Execute the `poll` command. Runs until the iteration cap or Ctrl-C;
/// failed iterations are counted, not fatal.
pub async fn execute(
    config_path: &Path,
    source: &str,
    platform: Option<&str>,
    interval: Option<u64>,
    max_iterations: Option<u32>,
) -> Result<()> {
    let (mut config, pipeline) = super::load(config_path)?;
    let options = poll_options(&mut config, interval, max_iterations)?;
    let key = config.source_key(source, platform)?;
    let cancel = super::cancel_on_ctrl_c();

    tracing::info!(
        source = key.source_id.as_str(),
        platform = key.platform.as_str(),
        interval_secs = options.interval().as_secs(),
        max_iterations = options.max_iterations(),
        "Starting poll"
    );
    let summary = pipeline
        .poll(&key, options, pipeline.sync_options(), &cancel)
        .await;

    println!("Polling of {key} stopped.");
    println!("  Iterations:       {}", summary.iterations);
    println!("  Failed:           {}", summary.failed_iterations);
    println!("  Messages stored:  {}", summary.total_messages);
    println!("  Avg / iteration:  {:.1}", summary.average_per_iteration);
    println!("  Duration:         {:.2}s", summary.duration_secs);
    if summary.cancelled {
        println!("  Stopped by interrupt");
    }
    super::print_json(&summary)
}

/// `polling` settings with the command-line overrides applied.
fn poll_options(
    config: &mut PipelineConfig,
    interval: Option<u64>,
    max_iterations: Option<u32>,
) -> Result<PollOptions> {
    if let Some(secs) = interval {
        config.polling.interval_seconds = secs;
    }
    if max_iterations.is_some() {
        config.polling.max_iterations = max_iterations;
    }
    config.poll_options()
}
