//! Subset of the `tfplugin5` provider protocol needed to read schemas.

use super::{unary, RpcResult, MAX_SCHEMA_MESSAGE_SIZE};
use tonic::transport::Channel;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schema {
    #[prost(int64, tag = "1")]
    pub version: i64,
    #[prost(message, optional, tag = "2")]
    pub block: Option<schema::Block>,
}

pub mod schema {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(int64, tag = "1")]
        pub version: i64,
        #[prost(message, repeated, tag = "2")]
        pub attributes: Vec<Attribute>,
        #[prost(message, repeated, tag = "3")]
        pub block_types: Vec<NestedBlock>,
        #[prost(string, tag = "4")]
        pub description: String,
        #[prost(enumeration = "super::super::StringKind", tag = "5")]
        pub description_kind: i32,
        #[prost(bool, tag = "6")]
        pub deprecated: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Attribute {
        #[prost(string, tag = "1")]
        pub name: String,
        /// JSON-encoded type constraint.
        #[prost(bytes = "vec", tag = "2")]
        pub r#type: Vec<u8>,
        #[prost(string, tag = "3")]
        pub description: String,
        #[prost(bool, tag = "4")]
        pub required: bool,
        #[prost(bool, tag = "5")]
        pub optional: bool,
        #[prost(bool, tag = "6")]
        pub computed: bool,
        #[prost(bool, tag = "7")]
        pub sensitive: bool,
        #[prost(enumeration = "super::super::StringKind", tag = "8")]
        pub description_kind: i32,
        #[prost(bool, tag = "9")]
        pub deprecated: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NestedBlock {
        #[prost(string, tag = "1")]
        pub type_name: String,
        #[prost(message, optional, tag = "2")]
        pub block: Option<Block>,
        #[prost(enumeration = "nested_block::NestingMode", tag = "3")]
        pub nesting: i32,
        #[prost(int64, tag = "4")]
        pub min_items: i64,
        #[prost(int64, tag = "5")]
        pub max_items: i64,
    }

    pub mod nested_block {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum NestingMode {
            Invalid = 0,
            Single = 1,
            List = 2,
            Set = 3,
            Map = 4,
            Group = 5,
        }
    }
}

pub mod get_provider_schema {
    use std::collections::HashMap;

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Request {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        #[prost(message, optional, tag = "1")]
        pub provider: Option<super::Schema>,
        #[prost(map = "string, message", tag = "2")]
        pub resource_schemas: HashMap<String, super::Schema>,
        #[prost(map = "string, message", tag = "3")]
        pub data_source_schemas: HashMap<String, super::Schema>,
        #[prost(message, repeated, tag = "4")]
        pub diagnostics: Vec<super::super::Diagnostic>,
        #[prost(message, optional, tag = "5")]
        pub provider_meta: Option<super::Schema>,
    }
}

/// Client for the `tfplugin5.Provider` service.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ProviderClient {
    /// Large providers exceed tonic's default 4 MiB decode limit.
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel)
                .max_decoding_message_size(MAX_SCHEMA_MESSAGE_SIZE),
        }
    }

    pub async fn get_schema(
        &mut self,
        request: get_provider_schema::Request,
    ) -> RpcResult<get_provider_schema::Response> {
        unary(&mut self.inner, "/tfplugin5.Provider/GetSchema", request).await
    }
}
