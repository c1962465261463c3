//! Wire types for the plugin protocols.
//!
//! Only the messages needed to read a provider schema and to shut a plugin
//! down are declared. Field tags follow the upstream `.proto` definitions;
//! unknown fields sent by newer plugins are skipped by the decoder.

pub mod controller;
pub mod tfplugin5;
pub mod tfplugin6;

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::Status;

pub type RpcResult<T> = Result<T, Status>;

/// Largest schema response accepted from a provider (64 MiB).
pub const MAX_SCHEMA_MESSAGE_SIZE: usize = 64 << 20;

/// Issue a unary call on `path` and return the decoded response message.
pub(crate) async fn unary<Req, Resp>(
    grpc: &mut tonic::client::Grpc<Channel>,
    path: &'static str,
    request: Req,
) -> RpcResult<Resp>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    grpc.ready()
        .await
        .map_err(|err| Status::unknown(format!("service was not ready: {err}")))?;
    let codec = ProstCodec::<Req, Resp>::default();
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await?;
    Ok(response.into_inner())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StringKind {
    Plain = 0,
    Markdown = 1,
}

/// Diagnostic message shared by both protocol versions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Diagnostic {
    #[prost(enumeration = "diagnostic::Severity", tag = "1")]
    pub severity: i32,
    #[prost(string, tag = "2")]
    pub summary: String,
    #[prost(string, tag = "3")]
    pub detail: String,
    #[prost(message, optional, tag = "4")]
    pub attribute: Option<AttributePath>,
}

pub mod diagnostic {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Severity {
        Invalid = 0,
        Error = 1,
        Warning = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributePath {
    #[prost(message, repeated, tag = "1")]
    pub steps: Vec<attribute_path::Step>,
}

pub mod attribute_path {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Step {
        #[prost(oneof = "step::Selector", tags = "1, 2, 3")]
        pub selector: Option<step::Selector>,
    }

    pub mod step {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Selector {
            #[prost(string, tag = "1")]
            AttributeName(String),
            #[prost(string, tag = "2")]
            ElementKeyString(String),
            #[prost(int64, tag = "3")]
            ElementKeyInt(i64),
        }
    }
}

impl AttributePath {
    /// Render as `network[0].labels["env"]`.
    pub fn render(&self) -> String {
        use attribute_path::step::Selector;

        let mut out = String::new();
        for selector in self.steps.iter().filter_map(|step| step.selector.as_ref()) {
            match selector {
                Selector::AttributeName(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                Selector::ElementKeyString(key) => out.push_str(&format!("[{key:?}]")),
                Selector::ElementKeyInt(index) => out.push_str(&format!("[{index}]")),
            }
        }
        out
    }
}
