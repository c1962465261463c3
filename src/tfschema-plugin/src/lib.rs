//! Provider plugin support for tfschema.
//!
//! This crate provides:
//! - Discovery of `terraform-provider-*` executables on disk
//! - A go-plugin compatible host that spawns a plugin, negotiates a protocol
//!   version and connects to its gRPC server
//! - Protocol 5 and 6 providers behind one [`ProviderInterface`]
//! - [`GrpcClient`], which implements `tfschema_core::SchemaClient`
//!
//! # Usage
//!
//! ```rust,ignore
//! use tfschema_core::SchemaClient;
//! use tfschema_plugin::{ClientOptions, GrpcClient};
//!
//! let mut client = GrpcClient::new("aws", &ClientOptions::default())?;
//! for name in client.resource_types()? {
//!     println!("{name}");
//! }
//! client.close()?;
//! ```

pub mod discovery;
mod error;
mod grpc_client;
pub mod handshake;
mod host;
pub mod proto;
pub mod provider;

pub use discovery::{find_plugin, PluginMeta, SearchOptions};
pub use error::PluginClientError;
pub use grpc_client::{new_grpc_client_config, ClientOptions, GrpcClient, PROVIDER_KIND};
pub use handshake::{HandshakeConfig, HandshakeResponse, PluginAddress, Protocol};
pub use host::{ClientConfig, PluginClient, PluginCommand, VersionedPlugins};
pub use provider::{ProviderInterface, PROVIDER_PLUGIN_NAME};
