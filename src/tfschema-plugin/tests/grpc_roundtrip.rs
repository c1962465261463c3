//! Schema reads and graceful shutdown against an in-process gRPC server.
//!
//! The plugin executable is a shell script that announces the address of a
//! tonic server running inside the test and exits once that server has
//! received `plugin.GRPCController/Shutdown`.
#![cfg(unix)]

mod support;

use std::convert::Infallible;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use support::{install_plugin, options, plugin_pid, process_alive, serving_until, spawn_lock};
use tempfile::TempDir;
use tfschema_core::{NestingMode, SchemaClient, SchemaError, Type};
use tfschema_plugin::proto::{controller, tfplugin5, tfplugin6};
use tfschema_plugin::GrpcClient;
use tokio::runtime::Runtime;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::Server;
use tonic::Status;

/// Canned answers served by [`FakePlugin`].
#[derive(Default)]
struct PluginState {
    v5: tfplugin5::get_provider_schema::Response,
    v6: tfplugin6::get_provider_schema::Response,
    shutdown_marker: PathBuf,
}

trait ServiceName {
    const NAME: &'static str;
}

struct ProviderV5;
struct ProviderV6;
struct Controller;

impl ServiceName for ProviderV5 {
    const NAME: &'static str = "tfplugin5.Provider";
}

impl ServiceName for ProviderV6 {
    const NAME: &'static str = "tfplugin6.Provider";
}

impl ServiceName for Controller {
    const NAME: &'static str = "plugin.GRPCController";
}

/// One gRPC service of the fake plugin; all share the same state.
struct FakePlugin<N> {
    state: Arc<PluginState>,
    _name: PhantomData<fn() -> N>,
}

impl<N> FakePlugin<N> {
    fn new(state: &Arc<PluginState>) -> Self {
        Self {
            state: Arc::clone(state),
            _name: PhantomData,
        }
    }
}

impl<N> Clone for FakePlugin<N> {
    fn clone(&self) -> Self {
        Self::new(&self.state)
    }
}

impl<N: ServiceName> NamedService for FakePlugin<N> {
    const NAME: &'static str = N::NAME;
}

impl<N, B> Service<http::Request<B>> for FakePlugin<N>
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let path = req.uri().path().to_string();
            let response = match path.as_str() {
                "/tfplugin5.Provider/GetSchema" => {
                    reply::<tfplugin5::get_provider_schema::Request, _, _>(req, state.v5.clone())
                        .await
                }
                "/tfplugin6.Provider/GetProviderSchema" => {
                    reply::<tfplugin6::get_provider_schema::Request, _, _>(req, state.v6.clone())
                        .await
                }
                "/plugin.GRPCController/Shutdown" => {
                    std::fs::write(&state.shutdown_marker, b"").unwrap();
                    reply::<controller::Empty, _, _>(req, controller::Empty {}).await
                }
                _ => http::Response::builder()
                    .status(200)
                    .header("grpc-status", "12")
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .unwrap(),
            };
            Ok(response)
        })
    }
}

/// Answers every request with a fixed message.
struct Fixed<Req, Resp> {
    response: Resp,
    _request: PhantomData<fn(Req)>,
}

impl<Req, Resp> UnaryService<Req> for Fixed<Req, Resp>
where
    Resp: Clone + Send + 'static,
{
    type Response = Resp;
    type Future = BoxFuture<tonic::Response<Resp>, Status>;

    fn call(&mut self, _request: tonic::Request<Req>) -> Self::Future {
        let response = self.response.clone();
        Box::pin(async move { Ok(tonic::Response::new(response)) })
    }
}

async fn reply<Req, Resp, B>(req: http::Request<B>, response: Resp) -> http::Response<BoxBody>
where
    Req: prost::Message + Default + Send + Sync + 'static,
    Resp: prost::Message + Clone + Send + Sync + 'static,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    let mut grpc = Grpc::new(ProstCodec::<Resp, Req>::default());
    let service = Fixed {
        response,
        _request: PhantomData,
    };
    grpc.unary(service, req).await
}

/// Start the fake plugin's gRPC server and return its `host:port`.
fn serve(runtime: &Runtime, state: PluginState) -> String {
    let state = Arc::new(state);
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Server::builder()
            .add_service(FakePlugin::<ProviderV5>::new(&state))
            .add_service(FakePlugin::<ProviderV6>::new(&state))
            .add_service(FakePlugin::<Controller>::new(&state));
        tokio::spawn(
            router.serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener)),
        );
        addr.to_string()
    })
}

fn start(dir: &Path, handshake: String) -> GrpcClient {
    let _lock = spawn_lock();
    install_plugin(dir, &serving_until(&handshake, &dir.join("shutdown")));
    GrpcClient::new(support::PLUGIN_NAME, &options(dir)).unwrap()
}

/// Close must go through Shutdown and let the plugin exit on its own.
fn assert_graceful_close(mut client: GrpcClient, dir: &Path) {
    let pid = plugin_pid(dir);
    let started = Instant::now();
    client.close().unwrap();

    assert!(dir.join("shutdown").exists());
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(!process_alive(pid));
}

fn v5_attribute(name: &str, ty: &str, required: bool) -> tfplugin5::schema::Attribute {
    tfplugin5::schema::Attribute {
        name: name.to_string(),
        r#type: ty.as_bytes().to_vec(),
        required,
        optional: !required,
        ..Default::default()
    }
}

fn v5_schema(attributes: Vec<tfplugin5::schema::Attribute>) -> tfplugin5::Schema {
    tfplugin5::Schema {
        version: 0,
        block: Some(tfplugin5::schema::Block {
            attributes,
            ..Default::default()
        }),
    }
}

fn v6_attribute(name: &str, ty: &str) -> tfplugin6::schema::Attribute {
    tfplugin6::schema::Attribute {
        name: name.to_string(),
        r#type: ty.as_bytes().to_vec(),
        optional: true,
        ..Default::default()
    }
}

fn v6_schema(attributes: Vec<tfplugin6::schema::Attribute>) -> tfplugin6::Schema {
    tfplugin6::Schema {
        version: 0,
        block: Some(tfplugin6::schema::Block {
            attributes,
            ..Default::default()
        }),
    }
}

#[test]
fn reads_protocol_5_schema_and_shuts_down_gracefully() {
    let dir = TempDir::new().unwrap();
    let mut v5 = tfplugin5::get_provider_schema::Response {
        provider: Some(v5_schema(vec![v5_attribute("region", r#""string""#, true)])),
        ..Default::default()
    };
    let mut instance = v5_schema(vec![
        v5_attribute("ami", r#""string""#, true),
        v5_attribute("tags", r#"["map","string"]"#, false),
    ]);
    if let Some(block) = instance.block.as_mut() {
        block.block_types.push(tfplugin5::schema::NestedBlock {
            type_name: "ebs_block_device".to_string(),
            block: Some(tfplugin5::schema::Block::default()),
            nesting: tfplugin5::schema::nested_block::NestingMode::Set as i32,
            min_items: 0,
            max_items: 0,
        });
    }
    v5.resource_schemas.insert("fake_vpc".to_string(), v5_schema(Vec::new()));
    v5.resource_schemas.insert("fake_instance".to_string(), instance);
    v5.data_source_schemas
        .insert("fake_ami".to_string(), v5_schema(vec![v5_attribute("owners", r#"["list","string"]"#, false)]));

    let runtime = Runtime::new().unwrap();
    let addr = serve(
        &runtime,
        PluginState {
            v5,
            shutdown_marker: dir.path().join("shutdown"),
            ..Default::default()
        },
    );
    let client = start(dir.path(), format!("1|5|tcp|{addr}|grpc|"));

    assert_eq!(
        client.resource_types().unwrap(),
        vec!["fake_instance", "fake_vpc"]
    );
    assert_eq!(client.data_sources().unwrap(), vec!["fake_ami"]);

    let provider = client.get_provider_schema().unwrap();
    assert!(provider.attributes["region"].required);

    let instance = client.get_resource_type_schema("fake_instance").unwrap();
    assert_eq!(
        instance.attributes["tags"].attr_type,
        Some(Type::Map(Box::new(Type::String)))
    );
    assert_eq!(
        instance.block_types["ebs_block_device"].nesting,
        NestingMode::Set
    );

    let ami = client.get_data_source_schema("fake_ami").unwrap();
    assert_eq!(
        ami.attributes["owners"].attr_type,
        Some(Type::List(Box::new(Type::String)))
    );

    let err = client.get_resource_type_schema("fake_missing").unwrap_err();
    assert!(matches!(err, SchemaError::ResourceTypeNotFound(name) if name == "fake_missing"));

    assert_graceful_close(client, dir.path());
}

#[test]
fn reads_protocol_6_schema_and_shuts_down_gracefully() {
    let dir = TempDir::new().unwrap();
    let rules = tfplugin6::schema::Attribute {
        name: "rules".to_string(),
        required: true,
        nested_type: Some(tfplugin6::schema::Object {
            attributes: vec![v6_attribute("port", r#""number""#)],
            nesting: tfplugin6::schema::object::NestingMode::List as i32,
            min_items: 0,
            max_items: 0,
        }),
        ..Default::default()
    };
    let mut v6 = tfplugin6::get_provider_schema::Response::default();
    for name in ["fake_firewall", "fake_bucket"] {
        v6.resource_schemas
            .insert(name.to_string(), v6_schema(vec![v6_attribute("name", r#""string""#), rules.clone()]));
    }
    v6.data_source_schemas
        .insert("fake_zone".to_string(), v6_schema(vec![v6_attribute("id", r#""string""#)]));

    let runtime = Runtime::new().unwrap();
    let addr = serve(
        &runtime,
        PluginState {
            v6,
            shutdown_marker: dir.path().join("shutdown"),
            ..Default::default()
        },
    );
    let client = start(dir.path(), format!("1|6|tcp|{addr}|grpc|"));

    assert_eq!(
        client.resource_types().unwrap(),
        vec!["fake_bucket", "fake_firewall"]
    );
    let firewall = client.get_resource_type_schema("fake_firewall").unwrap();
    assert_eq!(firewall.attributes["rules"].attr_type, None);
    assert_eq!(
        firewall.attributes["rules"].effective_type().to_string(),
        "list(object({port=number}))"
    );
    assert!(client.get_data_source_schema("fake_zone").is_ok());
    assert!(matches!(
        client.get_data_source_schema("fake_nope"),
        Err(SchemaError::DataSourceNotFound(_))
    ));

    assert_graceful_close(client, dir.path());
}

#[test]
fn reads_schemas_larger_than_four_mebibytes() {
    let dir = TempDir::new().unwrap();
    let description = "d".repeat(4096);
    let mut v6 = tfplugin6::get_provider_schema::Response::default();
    for i in 0..1500 {
        let mut attribute = v6_attribute("id", r#""string""#);
        attribute.description = description.clone();
        v6.resource_schemas
            .insert(format!("fake_res_{i:06}"), v6_schema(vec![attribute]));
    }

    let runtime = Runtime::new().unwrap();
    let addr = serve(
        &runtime,
        PluginState {
            v6,
            shutdown_marker: dir.path().join("shutdown"),
            ..Default::default()
        },
    );
    let client = start(dir.path(), format!("1|6|tcp|{addr}|grpc|"));

    let names = client.resource_types().unwrap();
    assert_eq!(names.len(), 1500);
    assert_eq!(names[0], "fake_res_000000");
    assert_eq!(names[1499], "fake_res_001499");

    assert_graceful_close(client, dir.path());
}
