//! Provider protocol variants behind one interface.
//!
//! Protocol 5 and protocol 6 providers differ only in their wire types; once
//! dispensed, callers talk to either through [`ProviderInterface`].

pub mod v5;
pub mod v6;

use crate::error::PluginClientError;
use crate::proto;
use tfschema_core::{Diagnostic, Diagnostics, GetProviderSchemaResponse, NestingMode, Severity};

/// Name under which providers are dispensed from a plugin.
pub const PROVIDER_PLUGIN_NAME: &str = "provider";

/// The capability set shared by all provider protocol versions.
pub trait ProviderInterface: Send {
    /// Fetch the full schema. Transport failures are reported as error diagnostics.
    fn get_provider_schema(&self) -> GetProviderSchemaResponse;

    /// Stop the provider and release its process.
    fn close(&mut self) -> Result<(), PluginClientError>;
}

pub(crate) fn convert_diagnostics(raw: Vec<proto::Diagnostic>) -> Diagnostics {
    raw.into_iter()
        .map(|diag| {
            let severity = match diag.severity() {
                proto::diagnostic::Severity::Warning => Severity::Warning,
                proto::diagnostic::Severity::Error | proto::diagnostic::Severity::Invalid => {
                    Severity::Error
                }
            };
            Diagnostic {
                severity,
                summary: diag.summary,
                detail: diag.detail,
                attribute: diag
                    .attribute
                    .map(|path| path.render())
                    .filter(|path| !path.is_empty()),
            }
        })
        .collect()
}

pub(crate) fn rpc_failure(status: &tonic::Status) -> GetProviderSchemaResponse {
    let mut response = GetProviderSchemaResponse::default();
    response.diagnostics.push(Diagnostic::error(
        "Plugin did not respond",
        format!(
            "The plugin encountered an error calling GetProviderSchema: {}",
            status.message()
        ),
    ));
    response
}

pub(crate) fn nesting_mode(raw: i32) -> NestingMode {
    match raw {
        1 => NestingMode::Single,
        2 => NestingMode::List,
        3 => NestingMode::Set,
        4 => NestingMode::Map,
        5 => NestingMode::Group,
        _ => NestingMode::Invalid,
    }
}
