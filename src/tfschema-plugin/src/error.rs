use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors from locating, launching and talking to a plugin process.
#[derive(Debug, Error)]
pub enum PluginClientError {
    #[error("failed to find {kind} plugin {name:?} (searched: {})", display_paths(.searched))]
    PluginNotFound {
        kind: String,
        name: String,
        searched: Vec<PathBuf>,
    },
    #[error("failed to spawn plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to build plugin runtime: {0}")]
    Runtime(std::io::Error),
    #[error("plugin process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("failed to read plugin handshake: {0}")]
    HandshakeRead(std::io::Error),
    #[error("invalid plugin handshake {line:?}: {reason}")]
    Handshake { line: String, reason: String },
    #[error("plugin did not complete its handshake within {0:?}")]
    StartTimeout(Duration),
    #[error("plugin exited before completing its handshake ({status})")]
    ProcessExited { status: String },
    #[error("failed to initialize GRPC plugin: {message}")]
    Connect { message: String },
    #[error("failed to dispense GRPC plugin: {name} is not served at protocol version {version}")]
    Dispense { name: String, version: u32 },
    #[error("unknown protocol version: {0}")]
    UnknownProtocolVersion(u32),
    #[error("failed to stop plugin process: {0}")]
    Kill(std::io::Error),
}

impl PluginClientError {
    pub(crate) fn exited(status: Option<ExitStatus>) -> Self {
        let status = status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "exit status unavailable".to_string());
        Self::ProcessExited { status }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no directories".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
