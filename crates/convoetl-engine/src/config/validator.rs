//! Semantic validation for parsed pipeline configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::config::types::PipelineConfig;

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.platform.trim().is_empty() {
        errors.push("platform must not be empty".to_string());
    }

    if config.extractor.path.as_os_str().is_empty() {
        errors.push("extractor.path must not be empty".to_string());
    }

    if config.state.path.as_os_str().is_empty() {
        errors.push("state.path must not be empty".to_string());
    }

    if config.backfill.batch_size == 0 {
        errors.push("backfill.batch_size must be at least 1".to_string());
    }

    if config.sync.limit == 0 {
        errors.push("sync.limit must be at least 1".to_string());
    }

    if config.polling.interval_seconds == 0 {
        errors.push("polling.interval_seconds must be at least 1".to_string());
    }

    if config.polling.max_iterations == Some(0) {
        errors.push("polling.max_iterations must be at least 1 when set".to_string());
    }

    if config.retry.delay_seconds == 0 {
        errors.push("retry.delay_seconds must be at least 1".to_string());
    }

    if config.retry.delay_seconds > config.retry.max_delay_seconds {
        errors.push(format!(
            "retry.delay_seconds ({}) exceeds retry.max_delay_seconds ({})",
            config.retry.delay_seconds, config.retry.max_delay_seconds
        ));
    }

    if config.concurrency.max_sources == 0 {
        errors.push("concurrency.max_sources must be at least 1".to_string());
    }

    let mut seen = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        if source.id.trim().is_empty() {
            errors.push(format!("Source {i} has an empty id"));
            continue;
        }
        if source
            .platform
            .as_deref()
            .is_some_and(|p| p.trim().is_empty())
        {
            errors.push(format!("Source '{}' has an empty platform", source.id));
        }
        let key = source.key(&config.platform);
        if !seen.insert(key.clone()) {
            errors.push(format!("Duplicate source '{key}'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}
