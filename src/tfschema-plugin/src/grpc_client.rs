//! The schema client backed by a provider plugin process.

use crate::discovery::{find_plugin, PluginMeta, SearchOptions};
use crate::error::PluginClientError;
use crate::handshake::{HandshakeConfig, Protocol};
use crate::host::{ClientConfig, PluginClient, PluginCommand, VersionedPlugins};
use crate::provider::{v5, v6, ProviderInterface, PROVIDER_PLUGIN_NAME};
use std::path::PathBuf;
use std::time::Duration;
use tfschema_core::{
    AppDirs, Block, GetProviderSchemaResponse, PluginSettings, SchemaClient, SchemaError,
    SchemaResult,
};

/// Plugin kind searched for by [`GrpcClient::new`].
pub const PROVIDER_KIND: &str = "provider";

/// Options controlling how a provider plugin is found and launched.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub root_dir: PathBuf,
    pub user_plugin_dir: Option<PathBuf>,
    pub search_path: bool,
    pub start_timeout: Duration,
    pub unix_socket_dir: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            user_plugin_dir: None,
            search_path: true,
            start_timeout: Duration::from_secs(60),
            unix_socket_dir: None,
        }
    }
}

impl ClientOptions {
    pub fn from_settings(settings: &PluginSettings, dirs: &AppDirs) -> Self {
        Self {
            root_dir: settings
                .root_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            user_plugin_dir: dirs.user_plugin_dir(),
            search_path: settings.search_path,
            start_timeout: Duration::from_secs(settings.start_timeout_secs),
            unix_socket_dir: settings.unix_socket_dir.clone(),
        }
    }

    fn search_options(&self) -> SearchOptions {
        SearchOptions {
            root_dir: self.root_dir.clone(),
            user_plugin_dir: self.user_plugin_dir.clone(),
            search_path: self.search_path,
        }
    }
}

/// Launch configuration for a provider plugin speaking protocol 5 or 6 over gRPC.
pub fn new_grpc_client_config(meta: &PluginMeta, options: &ClientOptions) -> ClientConfig {
    ClientConfig {
        handshake: HandshakeConfig::terraform(),
        allowed_protocols: vec![Protocol::Grpc],
        managed: true,
        cmd: PluginCommand::new(meta.path.clone()),
        versioned_plugins: VersionedPlugins::new()
            .with(5, &[PROVIDER_PLUGIN_NAME])
            .with(6, &[PROVIDER_PLUGIN_NAME]),
        start_timeout: options.start_timeout,
        unix_socket_dir: options.unix_socket_dir.clone(),
    }
}

/// Reads schemas from a provider plugin over gRPC.
///
/// The client owns the plugin process. Call [`SchemaClient::close`] when done;
/// dropping the client without closing it still stops the process.
pub struct GrpcClient {
    provider: Box<dyn ProviderInterface>,
}

impl GrpcClient {
    /// Find, start and connect to the named provider plugin.
    pub fn new(provider_name: &str, options: &ClientOptions) -> Result<Self, PluginClientError> {
        let meta = find_plugin(PROVIDER_KIND, provider_name, &options.search_options())?;
        let plugin = PluginClient::start(new_grpc_client_config(&meta, options))?;

        let channel = match plugin.dispense(PROVIDER_PLUGIN_NAME) {
            Ok(channel) => channel,
            Err(err) => return Err(abandon(plugin, err)),
        };

        let provider: Box<dyn ProviderInterface> = match plugin.negotiated_version() {
            5 => Box::new(v5::GrpcProvider::new(channel, plugin)),
            6 => Box::new(v6::GrpcProvider::new(channel, plugin)),
            version => {
                return Err(abandon(
                    plugin,
                    PluginClientError::UnknownProtocolVersion(version),
                ))
            }
        };
        tracing::info!(provider = provider_name, path = %meta.path.display(), "provider ready");

        Ok(Self::from_provider(provider))
    }

    /// Wrap an already dispensed provider.
    pub fn from_provider(provider: Box<dyn ProviderInterface>) -> Self {
        Self { provider }
    }

    fn get_schema(&self) -> SchemaResult<GetProviderSchemaResponse> {
        let response = self.provider.get_provider_schema();
        if response.diagnostics.has_errors() {
            return Err(SchemaError::Diagnostics(response.diagnostics));
        }
        for warning in response.diagnostics.warnings() {
            tracing::warn!(%warning, "provider reported a warning");
        }
        Ok(response)
    }
}

impl SchemaClient for GrpcClient {
    fn get_provider_schema(&self) -> SchemaResult<Block> {
        Ok(self.get_schema()?.provider.block)
    }

    fn get_resource_type_schema(&self, resource_type: &str) -> SchemaResult<Block> {
        self.get_schema()?
            .resource_types
            .remove(resource_type)
            .map(|schema| schema.block)
            .ok_or_else(|| SchemaError::ResourceTypeNotFound(resource_type.to_string()))
    }

    fn get_data_source_schema(&self, data_source: &str) -> SchemaResult<Block> {
        self.get_schema()?
            .data_sources
            .remove(data_source)
            .map(|schema| schema.block)
            .ok_or_else(|| SchemaError::DataSourceNotFound(data_source.to_string()))
    }

    fn resource_types(&self) -> SchemaResult<Vec<String>> {
        let mut names: Vec<String> = self.get_schema()?.resource_types.into_keys().collect();
        names.sort();
        Ok(names)
    }

    fn data_sources(&self) -> SchemaResult<Vec<String>> {
        let mut names: Vec<String> = self.get_schema()?.data_sources.into_keys().collect();
        names.sort();
        Ok(names)
    }

    fn close(&mut self) -> SchemaResult<()> {
        self.provider.close().map_err(|err| SchemaError::Close {
            message: err.to_string(),
        })
    }
}

/// Stop a plugin that cannot be used and hand back the original error.
fn abandon(mut plugin: PluginClient, err: PluginClientError) -> PluginClientError {
    if let Err(kill_err) = plugin.kill() {
        tracing::warn!(error = %kill_err, "failed to stop unusable plugin");
    }
    err
}
