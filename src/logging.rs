//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::EngineConfig;

pub const DEFAULT_FILTER: &str = "info,delivery_ledger_lib=debug";
pub const LOG_FILE_PREFIX: &str = "ledger";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub filter: Option<String>,
    pub max_files: usize,
}

impl From<&EngineConfig> for LogConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            filter: config.log_filter.clone(),
            max_files: config.max_log_files,
        }
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process; dropping it flushes and stops the file writer.
pub fn init(config: &LogConfig) -> std::io::Result<WorkerGuard> {
    fs::create_dir_all(&config.log_dir)?;
    prune_old_logs(&config.log_dir, config.max_files);

    let env_filter = config
        .filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Keep only the `max_files` most recent log files.
pub fn prune_old_logs(log_dir: &Path, max_files: usize) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .collect();

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}
