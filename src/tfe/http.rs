//! HTTP backend: request building, status mapping and service impls.
//!
//! This is the only place that interprets status codes.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::error::{TfeError, TfeResult};
use super::models::{
    ErrorDocument, GpgKeyDocument, GpgKeyList, GpgKeyRequest, RegistryName,
    RegistryProviderDocument, RegistryProviderRequest,
};
use super::{ClientConfig, GpgService, RegistryProviderService};

const USER_AGENT_VALUE: &str = concat!("terraform-provider-tfepatch/", env!("CARGO_PKG_VERSION"));
const JSON_API: &str = "application/vnd.api+json";

const GPG_KEYS: [&str; 5] = ["api", "registry", "private", "v2", "gpg-keys"];
const ORGANIZATIONS: [&str; 3] = ["api", "v2", "organizations"];
const REGISTRY_PROVIDERS: &str = "registry-providers";

/// HTTP implementation of the TFE services.
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub(crate) fn new(config: &ClientConfig) -> TfeResult<Self> {
        let base_url = config.base_url()?;
        let base_url = Url::parse(&base_url).map_err(|e| TfeError::Config {
            message: format!("invalid address {:?}: {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TfeError::Config {
                message: format!("address {:?} cannot be used as a base URL", base_url.as_str()),
            });
        }

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| TfeError::Config {
                message: "token contains characters not allowed in a header".to_string(),
            })?;
        authorization.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));
        default_headers.insert(AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|e| TfeError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    ///
    /// `/`, `?` and `#` inside a segment are encoded and cannot change the
    /// target. Dot segments would be dropped by URL normalization, so they
    /// are refused.
    fn url(&self, segments: &[&str]) -> TfeResult<Url> {
        if let Some(dot) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(TfeError::InvalidPathSegment {
                segment: dot.to_string(),
            });
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TfeError::Config {
                message: "base URL cannot take path segments".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> TfeResult<Response> {
        debug!(method = %method, url = %url, "sending TFE request");
        let path = url.path().to_string();

        let response = build(self.client.request(method, url)).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(map_status(status, &path, &body))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> TfeResult<T> {
        let response = self
            .send(Method::GET, url, |request| {
                if query.is_empty() {
                    request
                } else {
                    request.query(query)
                }
            })
            .await?;
        parse_body(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> TfeResult<T> {
        let response = self
            .send(Method::POST, url, |request| {
                request.header(CONTENT_TYPE, JSON_API).json(body)
            })
            .await?;
        parse_body(response).await
    }

    async fn delete_url(&self, url: Url) -> TfeResult<()> {
        self.send(Method::DELETE, url, |request| request).await?;
        Ok(())
    }

    fn gpg_key_url(&self, namespace: &str, key_id: &str) -> TfeResult<Url> {
        let mut segments = GPG_KEYS.to_vec();
        segments.extend([namespace, key_id]);
        self.url(&segments)
    }

    fn registry_providers_url(&self, organization: &str) -> TfeResult<Url> {
        let mut segments = ORGANIZATIONS.to_vec();
        segments.extend([organization, REGISTRY_PROVIDERS]);
        self.url(&segments)
    }

    fn registry_provider_url(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<Url> {
        let mut segments = ORGANIZATIONS.to_vec();
        segments.extend([
            organization,
            REGISTRY_PROVIDERS,
            registry_name.as_str(),
            namespace,
            name,
        ]);
        self.url(&segments)
    }
}

async fn parse_body<T: DeserializeOwned>(response: Response) -> TfeResult<T> {
    response
        .json()
        .await
        .map_err(|e| TfeError::InvalidResponse {
            message: format!("failed to parse response: {}", e),
        })
}

fn map_status(status: StatusCode, path: &str, body: &[u8]) -> TfeError {
    let message = serde_json::from_slice::<ErrorDocument>(body)
        .ok()
        .and_then(|doc| doc.message())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    match status {
        StatusCode::NOT_FOUND => TfeError::NotFound {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TfeError::Unauthorized { message },
        _ => TfeError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl GpgService for HttpBackend {
    async fn create(&self, request: &GpgKeyRequest) -> TfeResult<GpgKeyDocument> {
        self.post(self.url(&GPG_KEYS)?, request).await
    }

    async fn read(&self, namespace: &str, key_id: &str) -> TfeResult<GpgKeyDocument> {
        self.get(self.gpg_key_url(namespace, key_id)?, &[]).await
    }

    async fn delete(&self, namespace: &str, key_id: &str) -> TfeResult<()> {
        self.delete_url(self.gpg_key_url(namespace, key_id)?).await
    }

    async fn list(&self, namespaces: &[String]) -> TfeResult<GpgKeyList> {
        self.get(
            self.url(&GPG_KEYS)?,
            &[("filter[namespace]", namespaces.join(","))],
        )
        .await
    }
}

#[async_trait]
impl RegistryProviderService for HttpBackend {
    async fn create(
        &self,
        organization: &str,
        request: &RegistryProviderRequest,
    ) -> TfeResult<RegistryProviderDocument> {
        self.post(self.registry_providers_url(organization)?, request)
            .await
    }

    async fn read(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<RegistryProviderDocument> {
        let url = self.registry_provider_url(organization, registry_name, namespace, name)?;
        self.get(url, &[]).await
    }

    async fn delete(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<()> {
        let url = self.registry_provider_url(organization, registry_name, namespace, name)?;
        self.delete_url(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status_not_found() {
        let err = map_status(StatusCode::NOT_FOUND, "/api/x", b"");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_map_status_uses_error_document() {
        let body = br#"{"errors":[{"status":"422","title":"invalid","detail":"Name has already been taken"}]}"#;
        let err = map_status(StatusCode::UNPROCESSABLE_ENTITY, "/api/x", body);
        match err {
            TfeError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Name has already been taken");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_map_status_unauthorized_falls_back_to_reason() {
        let err = map_status(StatusCode::UNAUTHORIZED, "/api/x", b"not json");
        assert!(matches!(err, TfeError::Unauthorized { message } if message == "Unauthorized"));
    }

    fn backend(address: &str) -> HttpBackend {
        HttpBackend::new(&ClientConfig::new(address, "token")).unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = backend("tfe.example.com");
        assert_eq!(
            backend.gpg_key_url("acme", "ABC").unwrap().as_str(),
            "https://tfe.example.com/api/registry/private/v2/gpg-keys/acme/ABC"
        );
        assert_eq!(
            backend
                .registry_provider_url("acme", RegistryName::Public, "hashicorp", "aws")
                .unwrap()
                .as_str(),
            "https://tfe.example.com/api/v2/organizations/acme/registry-providers/public/hashicorp/aws"
        );
    }

    #[test]
    fn test_urls_keep_base_path() {
        let backend = backend("https://tfe.example.com/tfe/");
        assert_eq!(
            backend.registry_providers_url("acme").unwrap().path(),
            "/tfe/api/v2/organizations/acme/registry-providers"
        );
    }

    #[test]
    fn test_url_encodes_reserved_characters() {
        let backend = backend("tfe.example.com");

        let url = backend
            .registry_provider_url("acme", RegistryName::Public, "x/../../private/acme", "prod")
            .unwrap();
        assert_eq!(
            url.path(),
            "/api/v2/organizations/acme/registry-providers/public/x%2F..%2F..%2Fprivate%2Facme/prod"
        );

        let url = backend.gpg_key_url("acme", "KID?filter=x#frag").unwrap();
        assert_eq!(url.path(), "/api/registry/private/v2/gpg-keys/acme/KID%3Ffilter=x%23frag");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_url_rejects_dot_segments() {
        let backend = backend("tfe.example.com");
        for segment in ["..", ".", ""] {
            assert!(matches!(
                backend.gpg_key_url("acme", segment),
                Err(TfeError::InvalidPathSegment { .. })
            ));
        }
    }
}
