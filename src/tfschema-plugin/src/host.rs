//! Launching plugin processes and holding their RPC connection.

use crate::error::PluginClientError;
use crate::handshake::{HandshakeConfig, HandshakeResponse, PluginAddress, Protocol};
use crate::proto::controller::GrpcControllerClient;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

/// How long a plugin gets to exit after being asked to shut down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Command line used to start a plugin.
#[derive(Debug, Clone)]
pub struct PluginCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment on top of the inherited one and the handshake variables.
    pub env: Vec<(String, String)>,
}

impl PluginCommand {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

/// Capability names a plugin serves, keyed by application protocol version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedPlugins(BTreeMap<u32, BTreeSet<String>>);

impl VersionedPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, version: u32, names: &[&str]) -> Self {
        self.0
            .entry(version)
            .or_default()
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn versions(&self) -> Vec<u32> {
        self.0.keys().copied().collect()
    }

    pub fn plugins(&self, version: u32) -> Option<&BTreeSet<String>> {
        self.0.get(&version)
    }
}

/// Everything needed to launch a plugin and negotiate with it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub handshake: HandshakeConfig,
    pub allowed_protocols: Vec<Protocol>,
    /// Kill the process when its [`PluginClient`] is dropped without an explicit kill.
    pub managed: bool,
    pub cmd: PluginCommand,
    pub versioned_plugins: VersionedPlugins,
    pub start_timeout: Duration,
    pub unix_socket_dir: Option<PathBuf>,
}

/// A running plugin process and the channel to its RPC server.
///
/// The process is released exactly once: by [`PluginClient::kill`], or on
/// drop when the client is managed.
pub struct PluginClient {
    runtime: Runtime,
    child: Option<Child>,
    channel: Channel,
    negotiated_version: u32,
    versioned_plugins: VersionedPlugins,
    managed: bool,
    plugin_name: String,
    log_tasks: Vec<JoinHandle<()>>,
}

impl PluginClient {
    /// Spawn the plugin and block until its handshake completes.
    pub fn start(config: ClientConfig) -> Result<Self, PluginClientError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tfschema-plugin")
            .enable_all()
            .build()
            .map_err(PluginClientError::Runtime)?;

        let plugin_name = config
            .cmd
            .executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.cmd.executable.display().to_string());

        let mut cmd = Command::new(&config.cmd.executable);
        cmd.args(&config.cmd.args)
            .envs(config.cmd.env.iter().cloned())
            .envs(config.handshake.env(
                &config.versioned_plugins.versions(),
                config.unix_socket_dir.as_ref(),
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(config.managed);
        if let Some(dir) = &config.cmd.working_dir {
            cmd.current_dir(dir);
        }

        // Spawning registers the child with the runtime's signal driver.
        let mut child = {
            let _guard = runtime.enter();
            cmd.spawn().map_err(|source| PluginClientError::Spawn {
                path: config.cmd.executable.clone(),
                source,
            })?
        };
        tracing::debug!(
            plugin = %plugin_name,
            pid = ?child.id(),
            path = %config.cmd.executable.display(),
            "plugin started"
        );

        let mut log_tasks = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            log_tasks.push(runtime.spawn(forward_stderr(stderr, plugin_name.clone())));
        }
        let Some(stdout) = child.stdout.take() else {
            runtime.block_on(terminate(&mut child));
            return Err(PluginClientError::MissingPipe("stdout"));
        };
        let mut stdout = BufReader::new(stdout).lines();

        let negotiated = runtime.block_on(read_handshake(
            &mut stdout,
            &mut child,
            config.start_timeout,
        ));
        let response = match negotiated.and_then(|response| {
            response.validate(&config.allowed_protocols)?;
            Ok(response)
        }) {
            Ok(response) => response,
            Err(err) => {
                runtime.block_on(terminate(&mut child));
                abort_all(&log_tasks);
                return Err(err);
            }
        };

        let channel = {
            let _guard = runtime.enter();
            connect(&response.address)
        };
        let channel = match channel {
            Ok(channel) => channel,
            Err(err) => {
                runtime.block_on(terminate(&mut child));
                abort_all(&log_tasks);
                return Err(err);
            }
        };

        log_tasks.push(runtime.spawn(forward_stdout(stdout, plugin_name.clone())));
        tracing::debug!(
            plugin = %plugin_name,
            address = %response.address,
            protocol_version = response.protocol_version,
            "plugin handshake complete"
        );

        Ok(Self {
            runtime,
            child: Some(child),
            channel,
            negotiated_version: response.protocol_version,
            versioned_plugins: config.versioned_plugins,
            managed: config.managed,
            plugin_name,
            log_tasks,
        })
    }

    /// Application protocol version the plugin chose.
    pub fn negotiated_version(&self) -> u32 {
        self.negotiated_version
    }

    /// Hand out the RPC channel for a named capability of the negotiated version.
    pub fn dispense(&self, name: &str) -> Result<Channel, PluginClientError> {
        let plugins = self
            .versioned_plugins
            .plugins(self.negotiated_version)
            .ok_or(PluginClientError::UnknownProtocolVersion(
                self.negotiated_version,
            ))?;
        if !plugins.contains(name) {
            return Err(PluginClientError::Dispense {
                name: name.to_string(),
                version: self.negotiated_version,
            });
        }
        Ok(self.channel.clone())
    }

    /// Drive an RPC future to completion on the plugin's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|c| matches!(c.try_wait(), Ok(None)))
            .unwrap_or(false)
    }

    /// Ask the plugin to shut down, then force it if it does not exit in time.
    ///
    /// Later calls are no-ops.
    pub fn kill(&mut self) -> Result<(), PluginClientError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(plugin = %self.plugin_name, %status, "plugin already exited");
            abort_all(&self.log_tasks);
            return Ok(());
        }
        let channel = self.channel.clone();
        let plugin_name = self.plugin_name.clone();

        let result = self.runtime.block_on(async move {
            let mut controller = GrpcControllerClient::new(channel);
            if let Err(status) = tokio::time::timeout(SHUTDOWN_GRACE, controller.shutdown())
                .await
                .unwrap_or_else(|_| Err(tonic::Status::deadline_exceeded("shutdown timed out")))
            {
                tracing::debug!(plugin = %plugin_name, %status, "graceful shutdown request failed");
            }

            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(plugin = %plugin_name, %status, "plugin exited");
                    Ok(())
                }
                _ => {
                    tracing::warn!(plugin = %plugin_name, "plugin did not exit in time, killing");
                    child.kill().await.map_err(PluginClientError::Kill)
                }
            }
        });

        abort_all(&self.log_tasks);
        result
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        if self.managed {
            let _ = self.kill();
        }
    }
}

async fn read_handshake(
    stdout: &mut Lines<BufReader<ChildStdout>>,
    child: &mut Child,
    start_timeout: Duration,
) -> Result<HandshakeResponse, PluginClientError> {
    match tokio::time::timeout(start_timeout, stdout.next_line()).await {
        Err(_) => Err(PluginClientError::StartTimeout(start_timeout)),
        Ok(Err(err)) => Err(PluginClientError::HandshakeRead(err)),
        Ok(Ok(None)) => {
            let status = tokio::time::timeout(SHUTDOWN_GRACE, child.wait())
                .await
                .ok()
                .and_then(Result::ok);
            Err(PluginClientError::exited(status))
        }
        Ok(Ok(Some(line))) => HandshakeResponse::parse(&line),
    }
}

fn connect(address: &PluginAddress) -> Result<Channel, PluginClientError> {
    match address {
        PluginAddress::Tcp(addr) => Endpoint::from_shared(format!("http://{addr}"))
            .map(|endpoint| endpoint.connect_lazy())
            .map_err(|err| PluginClientError::Connect {
                message: err.to_string(),
            }),
        #[cfg(unix)]
        PluginAddress::Unix(path) => {
            let path = path.clone();
            Ok(Endpoint::from_static("http://plugin").connect_with_connector_lazy(
                tower::service_fn(move |_: tonic::transport::Uri| {
                    tokio::net::UnixStream::connect(path.clone())
                }),
            ))
        }
        #[cfg(not(unix))]
        PluginAddress::Unix(path) => Err(PluginClientError::Connect {
            message: format!(
                "unix socket {} is not supported on this platform",
                path.display()
            ),
        }),
    }
}

/// Kill and reap a child that never became usable.
async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::debug!(error = %err, "failed to kill plugin process");
    }
}

fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

async fn forward_stdout<R>(mut lines: Lines<BufReader<R>>, plugin: String)
where
    R: AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(plugin = %plugin, "stdout: {line}");
    }
}

async fn forward_stderr<R>(stderr: R, plugin: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log_plugin_line(&plugin, &line);
    }
}

/// Re-emit a plugin log line. Structured hclog JSON keeps its level.
fn log_plugin_line(plugin: &str, line: &str) {
    let parsed: Option<serde_json::Value> = serde_json::from_str(line).ok();
    let Some(entry) = parsed.as_ref().and_then(serde_json::Value::as_object) else {
        tracing::debug!(plugin, "{line}");
        return;
    };

    let message = entry
        .get("@message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(line);
    let module = entry
        .get("@module")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    match entry.get("@level").and_then(serde_json::Value::as_str) {
        Some("error") => tracing::error!(plugin, module, "{message}"),
        Some("warn") => tracing::warn!(plugin, module, "{message}"),
        Some("info") => tracing::info!(plugin, module, "{message}"),
        Some("trace") => tracing::trace!(plugin, module, "{message}"),
        _ => tracing::debug!(plugin, module, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_plugins_lists_versions_in_order() {
        let plugins = VersionedPlugins::new()
            .with(6, &["provider"])
            .with(5, &["provider"]);
        assert_eq!(plugins.versions(), vec![5, 6]);
        assert!(plugins.plugins(5).unwrap().contains("provider"));
        assert!(plugins.plugins(4).is_none());
    }

    #[test]
    fn plugin_command_starts_without_args() {
        let cmd = PluginCommand::new("/usr/bin/terraform-provider-null");
        assert!(cmd.args.is_empty());
        assert!(cmd.env.is_empty());
        assert!(cmd.working_dir.is_none());
    }
}
