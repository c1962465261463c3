//! The `plugin.GRPCController` service every go-plugin server exposes.

use super::{unary, RpcResult};
use tonic::transport::Channel;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Debug, Clone)]
pub struct GrpcControllerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcControllerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Ask the plugin process to exit.
    pub async fn shutdown(&mut self) -> RpcResult<Empty> {
        unary(&mut self.inner, "/plugin.GRPCController/Shutdown", Empty {}).await
    }
}
