//! Log setup.
//!
//! stdout and stderr belong to the form and the launcher, so everything goes
//! to a daily rolling file under the local data directory, filtered by
//! `RUST_LOG` (default `jira_quick_create=info,warn`).

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "jira_quick_create=info,warn";

const LOG_FILE_PREFIX: &str = "jira-create";

/// Rotated files kept on disk.
const MAX_LOG_FILES: usize = 7;

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created or a subscriber is
/// already installed.
pub fn init() -> anyhow::Result<()> {
    let dir = log_directory().context("Could not determine local data directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(&dir)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter_from(std::env::var("RUST_LOG").ok().as_deref()))
        .try_init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), log_dir = %dir.display(), "jira-create starting");
    Ok(())
}

/// `spec` if it parses, the default filter otherwise.
fn filter_from(spec: Option<&str>) -> EnvFilter {
    spec.and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Where log files are written.
pub fn log_directory() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("jira-quick-create").join("logs"))
}

pub fn shutdown() {
    tracing::info!("jira-create exiting");
}
