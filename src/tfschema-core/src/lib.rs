//! Core types for tfschema.
//!
//! This crate holds everything that does not touch a plugin process:
//! - The local schema model ([`Block`], [`Attribute`], [`NestedBlock`], [`Type`])
//! - Provider [`Diagnostics`] and the [`SchemaClient`] trait implemented by plugin clients
//! - Output rendering, configuration, directories and logging setup

pub mod client;
pub mod client_contract;
pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod paths;
pub mod render;
pub mod schema;

pub use client::{SchemaClient, SchemaError, SchemaResult};
pub use config::{Config, ConfigError, LogLevel, LoggingConfig, PluginSettings, ValidationError};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};
pub use render::{Format, RenderError};
pub use schema::{
    Attribute, Block, GetProviderSchemaResponse, NestedAttributes, NestedBlock, NestingMode,
    Schema, Type, TypeError,
};

pub const APP_NAME: &str = "tfschema";
pub const APP_AUTHOR: &str = "tfschema";
pub const APP_QUALIFIER: &str = "io";
