//! # Local Logger Setup
//!
//! Installs the global `tracing` subscriber:
//!
//! - the filter comes from `RUST_LOG` when set, else from the configured level,
//! - a console layer with targets and ANSI colors for humans,
//! - a JSON layer written to a daily rolling file through a non-blocking
//!   appender, for structured analysis.
//!
//! Old log files for the application are pruned on startup, keeping the
//! newest one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Deletes every `{app_name}.*` file in `log_dir` except the most recently
/// modified one. Returns the deleted paths.
///
/// # Errors
/// Fails when `log_dir` can not be read. Individual delete failures are
/// reported on stderr and skipped.
pub fn prune_logs(log_dir: &Path, app_name: &str) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{}.", app_name);
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .collect();

    // Newest first; ties broken by name so the daily suffix decides.
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut deleted = Vec::new();
    for (_, path) in entries.into_iter().skip(1) {
        match fs::remove_file(&path) {
            Ok(()) => deleted.push(path),
            Err(e) => eprintln!("Error deleting old log file {}: {}", path.display(), e),
        }
    }
    Ok(deleted)
}

/// # Setup Logging
///
/// Configures and installs the global subscriber. Keep the returned guard
/// alive for the lifetime of the process, or buffered file output is lost.
///
/// # Errors
/// Fails when the log directory can not be created or a global subscriber
/// is already installed.
pub fn setup_logging(log_dir: &Path, log_level: &str, app_name: &str) -> io::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    prune_logs(log_dir, app_name)?;

    let file_appender = rolling::daily(log_dir, app_name);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    info!("Logging initialized with level: {}", log_level);
    Ok(guard)
}
