use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use convoetl_engine::config::parser;
use convoetl_types::SourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// One crontab line
    Cron,
    /// A oneshot service plus a timer unit
    Systemd,
}

/// Execute the `schedule` command: print the scheduler entries that run
/// `convoetl sync` for `source` every `interval_minutes`.
pub fn execute(
    config_path: &Path,
    source: &str,
    platform: Option<&str>,
    method: Method,
    interval_minutes: u32,
) -> Result<()> {
    if interval_minutes == 0 {
        bail!("--interval-minutes must be at least 1");
    }
    let config = parser::parse_pipeline(config_path)
        .with_context(|| format!("Failed to parse pipeline: {}", config_path.display()))?;
    let key = config.source_key(source, platform)?;
    let workdir = std::env::current_dir().context("Failed to resolve working directory")?;
    let config_path = workdir.join(config_path);

    match method {
        Method::Cron => {
            println!("# Add with `crontab -e`:");
            println!("{}", cron_line(&key, interval_minutes, &workdir, &config_path));
        }
        Method::Systemd => {
            let name = unit_name(&key);
            let (service, timer) = systemd_units(&key, interval_minutes, &workdir, &config_path);
            println!("# /etc/systemd/system/{name}.service");
            println!("{service}");
            println!("# /etc/systemd/system/{name}.timer");
            println!("{timer}");
            println!("# Enable with: sudo systemctl enable --now {name}.timer");
        }
    }
    Ok(())
}

fn unit_name(key: &SourceKey) -> String {
    format!("convoetl-{}-{}", key.platform, key.source_id)
}

fn sync_command(key: &SourceKey, config_path: &Path) -> String {
    format!(
        "convoetl --config {} --platform {} sync {}",
        config_path.display(),
        key.platform,
        key.source_id
    )
}

/// Crontab entry. Intervals of an hour or more round down to whole hours.
fn cron_line(
    key: &SourceKey,
    interval_minutes: u32,
    workdir: &Path,
    config_path: &Path,
) -> String {
    let schedule = if interval_minutes < 60 {
        format!("*/{interval_minutes} * * * *")
    } else {
        format!("0 */{} * * *", interval_minutes / 60)
    };
    format!(
        "{schedule} cd {} && {} >> logs/convoetl_{}_{}.log 2>&1",
        workdir.display(),
        sync_command(key, config_path),
        key.platform,
        key.source_id
    )
}

/// Service and timer unit file contents.
fn systemd_units(
    key: &SourceKey,
    interval_minutes: u32,
    workdir: &Path,
    config_path: &Path,
) -> (String, String) {
    let name = unit_name(key);
    let service = format!(
        "[Unit]\n\
         Description=ConvoETL sync for {key}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         WorkingDirectory={}\n\
         ExecStart={}\n\
         User=convoetl\n\
         Group=convoetl\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        workdir.display(),
        sync_command(key, config_path),
    );
    let timer = format!(
        "[Unit]\n\
         Description=ConvoETL timer for {key}\n\
         Requires={name}.service\n\
         \n\
         [Timer]\n\
         OnBootSec=60\n\
         OnUnitActiveSec={}\n\
         \n\
         [Install]\n\
         WantedBy=timers.target\n",
        u64::from(interval_minutes) * 60,
    );
    (service, timer)
}
