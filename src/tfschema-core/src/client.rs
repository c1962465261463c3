use crate::diagnostics::Diagnostics;
use crate::schema::Block;
use thiserror::Error;

/// Failures of schema queries against a running plugin.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The provider reported errors while producing its schema.
    #[error("failed to get schema from provider: {0}")]
    Diagnostics(Diagnostics),
    #[error("failed to find resource type: {0}")]
    ResourceTypeNotFound(String),
    #[error("failed to find data source: {0}")]
    DataSourceNotFound(String),
    #[error("failed to close plugin: {message}")]
    Close { message: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Read access to a provider's schema.
///
/// Every query performs a fresh round trip to the plugin; nothing is cached.
/// Implementations own the plugin process and must be closed exactly once by
/// the caller when no longer needed.
pub trait SchemaClient: Send {
    /// Schema of the provider configuration block.
    fn get_provider_schema(&self) -> SchemaResult<Block>;

    fn get_resource_type_schema(&self, resource_type: &str) -> SchemaResult<Block>;

    fn get_data_source_schema(&self, data_source: &str) -> SchemaResult<Block>;

    /// All resource type names, sorted ascending.
    fn resource_types(&self) -> SchemaResult<Vec<String>>;

    /// All data source names, sorted ascending.
    fn data_sources(&self) -> SchemaResult<Vec<String>>;

    /// Shut down the plugin process.
    fn close(&mut self) -> SchemaResult<()>;
}
