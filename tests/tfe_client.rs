//! Integration tests for the HTTP TFE client.
//!
//! Uses wiremock for HTTP mocking. Covers request shapes for every endpoint
//! the provider consumes and the status mapping (401/404/422/5xx).

use serde_json::json;
use tfepatch::tfe::{
    ClientConfig, GpgKeyRequest, RegistryName, RegistryProviderRequest, TfeClient, TfeError,
};
use wiremock::matchers::{any, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JSON_API: &str = "application/vnd.api+json";

fn create_test_client(mock_server: &MockServer) -> TfeClient {
    let config = ClientConfig::new(mock_server.uri(), "test-token");
    TfeClient::new(&config).expect("failed to create client")
}

fn gpg_key_body(namespace: &str, key_id: &str) -> serde_json::Value {
    json!({
        "data": {
            "id": "13",
            "type": "gpg-keys",
            "attributes": {
                "ascii-armor": "-----BEGIN PGP PUBLIC KEY BLOCK-----",
                "created-at": "2023-01-01T00:00:00Z",
                "key-id": key_id,
                "namespace": namespace,
                "source": "",
                "trust-signature": ""
            }
        }
    })
}

#[tokio::test]
async fn test_create_gpg_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/private/v2/gpg-keys"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("content-type", JSON_API))
        .and(body_json(json!({
            "data": {
                "type": "gpg-keys",
                "attributes": {
                    "namespace": "acme",
                    "ascii-armor": "-----BEGIN PGP PUBLIC KEY BLOCK-----"
                }
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(gpg_key_body("acme", "32966F3FB5AC1129")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let doc = client
        .gpg()
        .create(&GpgKeyRequest::new("acme", "-----BEGIN PGP PUBLIC KEY BLOCK-----"))
        .await
        .expect("create failed");

    assert_eq!(doc.data.attributes.key_id, "32966F3FB5AC1129");
    assert_eq!(doc.data.attributes.namespace, "acme");
}

#[tokio::test]
async fn test_read_gpg_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/32966F3FB5AC1129"))
        .and(header("accept", JSON_API))
        .respond_with(ResponseTemplate::new(200).set_body_json(gpg_key_body("acme", "32966F3FB5AC1129")))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let doc = client
        .gpg()
        .read("acme", "32966F3FB5AC1129")
        .await
        .expect("read failed");

    assert_eq!(doc.data.attributes.ascii_armor, "-----BEGIN PGP PUBLIC KEY BLOCK-----");
}

#[tokio::test]
async fn test_read_gpg_key_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/MISSING"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.gpg().read("acme", "MISSING").await;

    assert!(matches!(result, Err(TfeError::NotFound { .. })));
}

#[tokio::test]
async fn test_delete_gpg_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/32966F3FB5AC1129"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client
        .gpg()
        .delete("acme", "32966F3FB5AC1129")
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_list_gpg_keys_filters_namespaces() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys"))
        .and(query_param("filter[namespace]", "acme,other"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                gpg_key_body("acme", "AAAA")["data"],
                gpg_key_body("other", "BBBB")["data"]
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let list = client
        .gpg()
        .list(&["acme".to_string(), "other".to_string()])
        .await
        .expect("list failed");

    let ids: Vec<_> = list.data.iter().map(|k| k.attributes.key_id.as_str()).collect();
    assert_eq!(ids, vec!["AAAA", "BBBB"]);
}

#[tokio::test]
async fn test_create_registry_provider() {
    let mock_server = MockServer::start().await;

    let body = json!({
        "data": {
            "type": "registry-providers",
            "attributes": {
                "name": "aws",
                "namespace": "hashicorp",
                "registry-name": "public"
            }
        }
    });
    let mut response = body.clone();
    response["data"]["id"] = json!("prov-cmEmLstBfjNNA9F3");

    Mock::given(method("POST"))
        .and(path("/api/v2/organizations/acme/registry-providers"))
        .and(body_json(body))
        .respond_with(ResponseTemplate::new(201).set_body_json(response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let doc = client
        .registry_providers()
        .create(
            "acme",
            &RegistryProviderRequest::new("hashicorp", "aws", RegistryName::Public),
        )
        .await
        .expect("create failed");

    assert_eq!(doc.data.id.as_deref(), Some("prov-cmEmLstBfjNNA9F3"));
    assert_eq!(doc.data.attributes.registry_name, RegistryName::Public);
}

#[tokio::test]
async fn test_create_registry_provider_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/organizations/acme/registry-providers"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{"status": "422", "title": "invalid attribute", "detail": "Name has already been taken"}]
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client
        .registry_providers()
        .create(
            "acme",
            &RegistryProviderRequest::new("hashicorp", "aws", RegistryName::Public),
        )
        .await;

    match result {
        Err(TfeError::Api { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "Name has already been taken");
        },
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_read_and_delete_registry_provider_paths() {
    let mock_server = MockServer::start().await;
    let provider_path = "/api/v2/organizations/acme/registry-providers/private/acme/internal";

    Mock::given(method("GET"))
        .and(path(provider_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "prov-1",
                "type": "registry-providers",
                "attributes": {"name": "internal", "namespace": "acme", "registry-name": "private"}
            }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(provider_path))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let doc = client
        .registry_providers()
        .read("acme", RegistryName::Private, "acme", "internal")
        .await
        .expect("read failed");
    assert_eq!(doc.data.attributes.name, "internal");

    client
        .registry_providers()
        .delete("acme", RegistryName::Private, "acme", "internal")
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/ABC"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.gpg().read("acme", "ABC").await;

    assert!(matches!(result, Err(TfeError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/ABC"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.gpg().delete("acme", "ABC").await;

    assert!(matches!(result, Err(TfeError::Api { status: 503, .. })));
}

#[tokio::test]
async fn test_invalid_response_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/ABC"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.gpg().read("acme", "ABC").await;

    assert!(matches!(result, Err(TfeError::InvalidResponse { .. })));
}

#[tokio::test]
async fn test_slash_in_namespace_stays_one_segment() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(
            "/api/v2/organizations/acme/registry-providers/public/x%2F..%2F..%2Fprivate%2Facme/prod",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    client
        .registry_providers()
        .delete("acme", RegistryName::Public, "x/../../private/acme", "prod")
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_query_and_fragment_characters_are_encoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/registry/private/v2/gpg-keys/acme/KID%3Ffilter=x%23frag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gpg_key_body("acme", "KID")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let doc = client
        .gpg()
        .read("acme", "KID?filter=x#frag")
        .await
        .expect("read failed");
    assert_eq!(doc.data.attributes.key_id, "KID");
}

#[tokio::test]
async fn test_dot_segment_rejected_without_request() {
    let mock_server = MockServer::start().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.gpg().delete("..", "ABC").await;

    assert!(matches!(
        result,
        Err(TfeError::InvalidPathSegment { segment }) if segment == ".."
    ));
}
