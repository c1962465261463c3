use crate::client::{SchemaClient, SchemaError};
use thiserror::Error;

/// Expectations supplied by a caller to run the shared client contract suite.
#[derive(Debug, Clone)]
pub struct ClientContractExpectations {
    /// A resource type the provider is known to expose.
    pub resource_type: Option<String>,
    /// A data source the provider is known to expose.
    pub data_source: Option<String>,
    /// A name that neither map contains.
    pub missing_name: String,
}

/// Errors surfaced by the client contract test harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientContractError {
    #[error("{listing} are not sorted ascending: {names:?}")]
    Unsorted {
        listing: &'static str,
        names: Vec<String>,
    },
    #[error("{listing} do not contain expected name {expected}")]
    MissingExpected {
        listing: &'static str,
        expected: String,
    },
    #[error("{listing} entry {name} cannot be looked up: {message}")]
    LookupFailed {
        listing: &'static str,
        name: String,
        message: String,
    },
    #[error("lookup of missing {kind} {name} returned {outcome} instead of a not-found error")]
    MissingNotReported {
        kind: &'static str,
        name: String,
        outcome: String,
    },
    #[error("client error while running contract: {0}")]
    ClientFailure(String),
}

/// Run the shared contract suite against a schema client.
///
/// Every listed name must resolve to a block, listings must be sorted and
/// unknown names must produce the matching not-found error naming the input.
pub fn run_client_contract<C: SchemaClient + ?Sized>(
    client: &C,
    expectations: &ClientContractExpectations,
) -> Result<(), ClientContractError> {
    client
        .get_provider_schema()
        .map_err(|err| ClientContractError::ClientFailure(err.to_string()))?;

    let resource_types = client
        .resource_types()
        .map_err(|err| ClientContractError::ClientFailure(err.to_string()))?;
    verify_listing(
        "resource types",
        &resource_types,
        expectations.resource_type.as_deref(),
        |name| client.get_resource_type_schema(name).map(|_| ()),
    )?;

    let data_sources = client
        .data_sources()
        .map_err(|err| ClientContractError::ClientFailure(err.to_string()))?;
    verify_listing(
        "data sources",
        &data_sources,
        expectations.data_source.as_deref(),
        |name| client.get_data_source_schema(name).map(|_| ()),
    )?;

    verify_missing(client, &expectations.missing_name)
}

fn verify_listing(
    listing: &'static str,
    names: &[String],
    expected: Option<&str>,
    lookup: impl Fn(&str) -> Result<(), SchemaError>,
) -> Result<(), ClientContractError> {
    if names.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(ClientContractError::Unsorted {
            listing,
            names: names.to_vec(),
        });
    }

    if let Some(expected) = expected {
        if !names.iter().any(|name| name == expected) {
            return Err(ClientContractError::MissingExpected {
                listing,
                expected: expected.to_string(),
            });
        }
    }

    for name in names {
        lookup(name).map_err(|err| ClientContractError::LookupFailed {
            listing,
            name: name.clone(),
            message: err.to_string(),
        })?;
    }

    Ok(())
}

fn verify_missing<C: SchemaClient + ?Sized>(
    client: &C,
    name: &str,
) -> Result<(), ClientContractError> {
    match client.get_resource_type_schema(name) {
        Err(SchemaError::ResourceTypeNotFound(reported)) if reported == name => {}
        other => {
            return Err(ClientContractError::MissingNotReported {
                kind: "resource type",
                name: name.to_string(),
                outcome: describe(other),
            })
        }
    }

    match client.get_data_source_schema(name) {
        Err(SchemaError::DataSourceNotFound(reported)) if reported == name => Ok(()),
        other => Err(ClientContractError::MissingNotReported {
            kind: "data source",
            name: name.to_string(),
            outcome: describe(other),
        }),
    }
}

fn describe<T>(outcome: Result<T, SchemaError>) -> String {
    match outcome {
        Ok(_) => "a block".to_string(),
        Err(err) => format!("error \"{err}\""),
    }
}
