//! Drives the provider over a real gRPC connection.

use std::sync::Arc;

use serde_json::{json, Value};
use tfepatch::generated::diagnostic::Severity;
use tfepatch::generated::provider_client::ProviderClient;
use tfepatch::generated::{
    ConfigureRequest, CreateRequest, GetMetadataRequest, GetSchemaRequest,
    ImportResourceStateRequest, PlanRequest, ReadRequest,
};
use tfepatch::testing::FakeTfe;
use tfepatch::tfe::RegistryName;
use tfepatch::{ProviderGrpcService, TfeProvider};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};
use tonic::Code;

const REGISTRY_PROVIDER: &str = "tfepatch_registry_provider";

async fn start(provider: TfeProvider) -> ProviderClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = ProviderGrpcService::new(Arc::new(provider)).into_server();

    tokio::spawn(async move {
        Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    ProviderClient::connect(format!("http://{}", addr))
        .await
        .expect("connect failed")
}

async fn configured_client() -> (ProviderClient<Channel>, FakeTfe) {
    let fake = FakeTfe::new();
    let mut client = start(TfeProvider::with_client_factory(fake.factory()).unwrap()).await;

    let response = client
        .configure(ConfigureRequest {
            config: bytes(&json!({
                "hostname": "tfe.example.com",
                "token": "test-token",
                "organization": "acme"
            })),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

    (client, fake)
}

fn bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

fn parse(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn aws() -> Value {
    json!({
        "organization": "acme",
        "namespace": "hashicorp",
        "name": "aws",
        "registry_name": "public"
    })
}

#[tokio::test]
async fn test_metadata_and_schema() {
    let mut client = start(TfeProvider::new().unwrap()).await;

    let metadata = client
        .get_metadata(GetMetadataRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(metadata.type_name, "tfepatch");
    assert_eq!(
        metadata.resources,
        vec!["tfepatch_gpg_key", "tfepatch_registry_provider"]
    );

    let schema = client
        .get_schema(GetSchemaRequest {})
        .await
        .unwrap()
        .into_inner();
    let registry = &schema.resources[REGISTRY_PROVIDER];
    let registry_name = registry
        .attributes
        .iter()
        .find(|a| a.name == "registry_name")
        .unwrap();
    assert!(registry_name.required);
    assert!(registry_name.force_new);
    assert_eq!(registry_name.allowed_values, vec!["public", "private"]);

    let provider = schema.provider.unwrap();
    let token = provider.attributes.iter().find(|a| a.name == "token").unwrap();
    assert!(token.sensitive);
}

#[tokio::test]
async fn test_configure_missing_token_returns_diagnostic() {
    let mut client = start(TfeProvider::new().unwrap()).await;

    let response = client
        .configure(ConfigureRequest {
            config: bytes(&json!({
                "hostname": "tfe.example.com",
                "organization": "acme"
            })),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].severity, Severity::Error as i32);
    assert_eq!(response.diagnostics[0].attribute, "token");
}

#[tokio::test]
async fn test_invalid_json_is_invalid_argument() {
    let mut client = start(TfeProvider::new().unwrap()).await;

    let status = client
        .configure(ConfigureRequest {
            config: b"{not json".to_vec(),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_plan_create_read() {
    let (mut client, _fake) = configured_client().await;

    let plan = client
        .plan(PlanRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            prior_state: vec![],
            proposed_state: bytes(&aws()),
            config: bytes(&aws()),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(plan.diagnostics.is_empty());
    assert!(!plan.changes.is_empty());

    let created = client
        .create(CreateRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            planned_state: plan.planned_state,
        })
        .await
        .unwrap()
        .into_inner();
    assert!(created.diagnostics.is_empty());
    let state = parse(&created.state);
    assert_eq!(state["id"], "hashicorp||aws||public");

    let read = client
        .read(ReadRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            current_state: created.state,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(parse(&read.state), state);
}

#[tokio::test]
async fn test_plan_invalid_registry_name_returns_diagnostic() {
    let (mut client, fake) = configured_client().await;
    let mut config = aws();
    config["registry_name"] = json!("internal");

    let plan = client
        .plan(PlanRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            prior_state: vec![],
            proposed_state: bytes(&config),
            config: bytes(&config),
        })
        .await
        .unwrap()
        .into_inner();

    assert!(plan.planned_state.is_empty());
    assert_eq!(plan.diagnostics[0].attribute, "registry_name");
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_read_of_deleted_resource_returns_empty_state() {
    let (mut client, fake) = configured_client().await;
    let created = client
        .create(CreateRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            planned_state: bytes(&aws()),
        })
        .await
        .unwrap()
        .into_inner();

    fake.client()
        .registry_providers()
        .delete("acme", RegistryName::Public, "hashicorp", "aws")
        .await
        .unwrap();

    let read = client
        .read(ReadRequest {
            resource_type: REGISTRY_PROVIDER.to_string(),
            current_state: created.state,
        })
        .await
        .unwrap()
        .into_inner();
    assert!(read.state.is_empty());
    assert!(read.diagnostics.is_empty());
}

#[tokio::test]
async fn test_import_resource_state() {
    let (mut client, _fake) = configured_client().await;

    let response = client
        .import_resource_state(ImportResourceStateRequest {
            resource_type: "tfepatch_gpg_key".to_string(),
            id: "acme||32966F3FB5AC1129".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.imported.len(), 1);
    let state = parse(&response.imported[0].state);
    assert_eq!(state["namespace"], "acme");
    assert_eq!(state["key_id"], "32966F3FB5AC1129");

    let bad = client
        .import_resource_state(ImportResourceStateRequest {
            resource_type: "tfepatch_gpg_key".to_string(),
            id: "acme".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(bad.imported.is_empty());
    assert_eq!(bad.diagnostics[0].severity, Severity::Error as i32);
}
