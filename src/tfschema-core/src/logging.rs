use crate::{config::LoggingConfig, paths::AppDirs};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file writer flushing until dropped.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// Schema output is written to stdout, so the console sink is stderr.
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let log_dir = dirs.log_dir().to_path_buf();
    fs::create_dir_all(&log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.clone(),
        source,
    })?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.level.as_filter_directive()).map_err(|source| {
            LoggingError::ParseLevel {
                level: config.level.as_filter_directive().to_string(),
                source,
            }
        })?,
    };

    let (file, file_guard) = build_file_writer(config, &log_dir)?;
    let writer = if config.console {
        BoxMakeWriter::new(std::io::stderr.and(file))
    } else {
        BoxMakeWriter::new(file)
    };

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(config.console)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn build_file_writer(
    config: &LoggingConfig,
    log_dir: &Path,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let file_stem = config.file_name.as_deref().unwrap_or("tfschema.log");
    cleanup_old_logs(log_dir, file_stem, config.max_log_files.max(1))?;

    let appender = tracing_appender::rolling::daily(log_dir, file_stem);
    Ok(tracing_appender::non_blocking(appender))
}

fn cleanup_old_logs(dir: &Path, file_stem: &str, max_files: usize) -> Result<(), LoggingError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(file_stem) {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(|mtime| (entry.path(), mtime))
            } else {
                None
            }
        })
        .collect();

    entries.sort_by_key(|(_, modified)| *modified);
    if entries.len() <= max_files {
        return Ok(());
    }

    let remove_count = entries.len() - max_files;
    for (path, _) in entries.into_iter().take(remove_count) {
        fs::remove_file(&path).map_err(|source| LoggingError::Cleanup { path, source })?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse log level {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
