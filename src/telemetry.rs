use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, TelemetryConfig};

const DEFAULT_FILTER: &str = "info";

/// Initialize logging
///
/// Logs go to stdout unless telemetry is enabled, in which case they are
/// appended to the configured log file. `RUST_LOG` overrides the level.
///
/// # Errors
/// Returns error if the log directory or file cannot be created
pub fn init(config: &TelemetryConfig) -> Result<()> {
    if !config.enabled {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .init();
        return Ok(());
    }

    let expanded_path = Config::expand_path(&config.log_path)?;

    if let Some(parent) = expanded_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&expanded_path)
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .init();

    tracing::info!("telemetry initialized: {}", expanded_path.display());

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    #[ignore = "installs the global tracing subscriber"]
    fn test_init_with_telemetry_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("nested").join("assistant.log");
        let config = TelemetryConfig {
            enabled: true,
            log_path: log_path.display().to_string(),
        };

        init(&config).unwrap();
        assert!(log_path.exists());
    }
}
