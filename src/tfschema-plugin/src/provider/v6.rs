//! Protocol 6 providers (Terraform 1.0 and later).
//!
//! Besides nested blocks, protocol 6 lets an attribute carry a nested
//! attribute object instead of a type constraint.

use super::{convert_diagnostics, nesting_mode, rpc_failure, ProviderInterface};
use crate::error::PluginClientError;
use crate::host::PluginClient;
use crate::proto::tfplugin6::{get_provider_schema, schema, ProviderClient, Schema as RawSchema};
use std::collections::{BTreeMap, HashMap};
use tfschema_core::{
    Attribute, Block, Diagnostic, GetProviderSchemaResponse, NestedAttributes, NestedBlock,
    Schema, Type, TypeError,
};
use tonic::transport::Channel;

pub struct GrpcProvider {
    client: ProviderClient,
    plugin: PluginClient,
}

impl GrpcProvider {
    pub fn new(channel: Channel, plugin: PluginClient) -> Self {
        Self {
            client: ProviderClient::new(channel),
            plugin,
        }
    }
}

impl ProviderInterface for GrpcProvider {
    fn get_provider_schema(&self) -> GetProviderSchemaResponse {
        let mut client = self.client.clone();
        match self
            .plugin
            .block_on(client.get_provider_schema(get_provider_schema::Request {}))
        {
            Ok(raw) => convert_response(raw),
            Err(status) => rpc_failure(&status),
        }
    }

    fn close(&mut self) -> Result<(), PluginClientError> {
        self.plugin.kill()
    }
}

pub(crate) fn convert_response(raw: get_provider_schema::Response) -> GetProviderSchemaResponse {
    let get_provider_schema::Response {
        provider,
        resource_schemas,
        data_source_schemas,
        diagnostics,
        provider_meta,
    } = raw;

    let mut response = GetProviderSchemaResponse {
        diagnostics: convert_diagnostics(diagnostics),
        ..Default::default()
    };
    let decoded = provider
        .map(convert_schema)
        .transpose()
        .and_then(|provider| {
            response.provider = provider.unwrap_or_default();
            response.provider_meta = provider_meta.map(convert_schema).transpose()?;
            response.resource_types = convert_schemas(resource_schemas)?;
            response.data_sources = convert_schemas(data_source_schemas)?;
            Ok(())
        });
    if let Err(err) = decoded {
        response
            .diagnostics
            .push(Diagnostic::error("Invalid provider schema", err.to_string()));
    }
    response
}

fn convert_schemas(raw: HashMap<String, RawSchema>) -> Result<HashMap<String, Schema>, TypeError> {
    raw.into_iter()
        .map(|(name, schema)| Ok((name, convert_schema(schema)?)))
        .collect()
}

fn convert_schema(raw: RawSchema) -> Result<Schema, TypeError> {
    Ok(Schema {
        version: raw.version,
        block: raw.block.map(convert_block).transpose()?.unwrap_or_default(),
    })
}

fn convert_block(raw: schema::Block) -> Result<Block, TypeError> {
    let block_types = raw
        .block_types
        .into_iter()
        .map(|nested| {
            let block = nested.block.map(convert_block).transpose()?.unwrap_or_default();
            Ok((
                nested.type_name,
                NestedBlock {
                    nesting: nesting_mode(nested.nesting),
                    min_items: nested.min_items,
                    max_items: nested.max_items,
                    block,
                },
            ))
        })
        .collect::<Result<_, TypeError>>()?;

    Ok(Block {
        attributes: convert_attributes(raw.attributes)?,
        block_types,
        description: raw.description,
        deprecated: raw.deprecated,
    })
}

fn convert_attributes(raw: Vec<schema::Attribute>) -> Result<BTreeMap<String, Attribute>, TypeError> {
    raw.into_iter()
        .map(|attr| {
            let nested_type = attr
                .nested_type
                .map(|object| {
                    Ok::<_, TypeError>(NestedAttributes {
                        nesting: nesting_mode(object.nesting),
                        attributes: convert_attributes(object.attributes)?,
                    })
                })
                .transpose()?;
            // Attributes with a nested object leave the type constraint empty.
            let attr_type = if attr.r#type.is_empty() && nested_type.is_some() {
                None
            } else {
                Some(Type::from_json(&attr.r#type)?)
            };
            Ok((
                attr.name,
                Attribute {
                    attr_type,
                    nested_type,
                    description: attr.description,
                    required: attr.required,
                    optional: attr.optional,
                    computed: attr.computed,
                    sensitive: attr.sensitive,
                    deprecated: attr.deprecated,
                },
            ))
        })
        .collect()
}
