use crate::paths::AppDirs;
use crate::render::Format;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    /// Output format used when `--format` is not given.
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub plugin: PluginSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            format: Format::default(),
            plugin: PluginSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How provider plugins are located and launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory searched for `.terraform` plugin trees. Defaults to the working directory.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    /// Seconds to wait for a plugin to complete its handshake.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Directory plugins should create their unix sockets in.
    #[serde(default)]
    pub unix_socket_dir: Option<PathBuf>,
    /// Also look for unversioned plugin binaries on `$PATH`.
    #[serde(default = "default_search_path")]
    pub search_path: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            root_dir: None,
            start_timeout_secs: default_start_timeout_secs(),
            unix_socket_dir: None,
            search_path: default_search_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    /// Mirror log lines to stderr.
    #[serde(default = "default_console_enabled")]
    pub console: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            console: default_console_enabled(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("plugin.start_timeout_secs must be greater than zero")]
    ZeroStartTimeout,
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    fn from_toml(contents: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        if self.plugin.start_timeout_secs == 0 {
            return Err(ValidationError::ZeroStartTimeout);
        }
        Ok(())
    }
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_start_timeout_secs() -> u64 {
    60
}

fn default_search_path() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_max_log_files() -> usize {
    7
}

fn default_console_enabled() -> bool {
    true
}
