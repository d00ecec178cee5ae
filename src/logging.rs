//! Tracing setup for the `formvault` binary.
//!
//! Events go to the systemd journal when one is reachable. Elsewhere they
//! are appended to `formvault.log`, rotated daily.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directive, e.g. `formvault=debug`.
pub const LOG_ENV: &str = "FORMVAULT_LOG";

const LOG_FILE: &str = "formvault.log";

/// Flushes the file writer on process exit.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("formvault")
        .join("logs")
}

/// Install the global subscriber. `log_dir` is only used for the file
/// backend and defaults to the platform data directory.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    if let Ok(journal) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter())
            .with(journal)
            .try_init()
            .context("Failed to install journald subscriber")?;
        tracing::debug!("logging to journald");
        return Ok(());
    }

    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE));
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install file subscriber")?;
    tracing::debug!(dir = %log_dir.display(), "logging to file");
    Ok(())
}
