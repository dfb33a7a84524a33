mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use convoetl_types::{RunMode, SyncMode};

use crate::commands::schedule::Method;

#[derive(Parser)]
#[command(
    name = "convoetl",
    version,
    about = "Checkpointed extraction of conversational data into a local store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to pipeline YAML file
    #[arg(long, short, default_value = "convoetl.yaml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Platform of the given source(s). Needed when an id is configured on
    /// more than one platform.
    #[arg(long, global = true)]
    platform: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a source's full history from its checkpoint in batches
    Backfill {
        /// Source identifier (chat, channel or group id)
        source: String,
        /// Messages per extractor call (default: backfill.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Fetch messages newer than the checkpoint, once
    Sync {
        source: String,
        /// Maximum messages to fetch (default: sync.limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Sync repeatedly on an interval until Ctrl-C or the iteration cap
    Poll {
        source: String,
        /// Seconds between iterations (default: polling.interval_seconds)
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many iterations (default: polling.max_iterations)
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Backfill or sync, picking the mode from checkpoint state
    Run {
        source: String,
        /// auto, backfill or incremental
        #[arg(long, default_value = "auto")]
        mode: RunMode,
    },
    /// Run several sources concurrently (default: every configured source)
    RunMultiple {
        sources: Vec<String>,
        /// backfill or incremental
        #[arg(long, default_value = "incremental")]
        mode: SyncMode,
    },
    /// Show recent run history
    Runs {
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show message store statistics
    Stats {
        #[arg(long)]
        source: Option<String>,
    },
    /// Print a cron entry or systemd units that sync a source periodically
    Schedule {
        source: String,
        #[arg(long, value_enum, default_value = "cron")]
        method: Method,
        #[arg(long, default_value_t = 5)]
        interval_minutes: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let config = cli.config.as_path();
    let platform = cli.platform.as_deref();
    match cli.command {
        Commands::Backfill { source, batch_size } => {
            commands::backfill::execute(config, &source, platform, batch_size).await
        }
        Commands::Sync { source, limit } => {
            commands::sync::execute(config, &source, platform, limit).await
        }
        Commands::Poll {
            source,
            interval,
            max_iterations,
        } => commands::poll::execute(config, &source, platform, interval, max_iterations).await,
        Commands::Run { source, mode } => {
            commands::run::execute(config, &source, platform, mode).await
        }
        Commands::RunMultiple { sources, mode } => {
            commands::run_multiple::execute(config, sources, platform, mode).await
        }
        Commands::Runs { source, limit } => {
            commands::runs::execute(config, source.as_deref(), platform, limit).await
        }
        Commands::Stats { source } => {
            commands::stats::execute(config, source.as_deref(), platform).await
        }
        Commands::Schedule {
            source,
            method,
            interval_minutes,
        } => commands::schedule::execute(config, &source, platform, method, interval_minutes),
    }
}
