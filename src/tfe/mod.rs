//! Terraform Enterprise API client.
//!
//! Only the operations the provider consumes are covered. The provider talks
//! to the [`GpgService`] and [`RegistryProviderService`] traits, so the HTTP
//! backend can be swapped for an in-memory one in tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

mod error;
mod http;
pub mod models;

pub use error::{TfeError, TfeResult};
pub use models::{
    GpgKeyAttributes, GpgKeyDocument, GpgKeyList, GpgKeyRequest, RegistryName,
    RegistryProviderAttributes, RegistryProviderDocument, RegistryProviderRequest,
};

use http::HttpBackend;

/// GPG keys in the private registry.
#[async_trait]
pub trait GpgService: Send + Sync {
    /// Upload an ASCII-armored public key. The server assigns the key id.
    async fn create(&self, request: &GpgKeyRequest) -> TfeResult<GpgKeyDocument>;

    /// Fetch a key by namespace and key id.
    async fn read(&self, namespace: &str, key_id: &str) -> TfeResult<GpgKeyDocument>;

    /// Delete a key by namespace and key id.
    async fn delete(&self, namespace: &str, key_id: &str) -> TfeResult<()>;

    /// List every key in the given namespaces.
    async fn list(&self, namespaces: &[String]) -> TfeResult<GpgKeyList>;
}

/// Providers registered in an organization's public or private registry.
#[async_trait]
pub trait RegistryProviderService: Send + Sync {
    async fn create(
        &self,
        organization: &str,
        request: &RegistryProviderRequest,
    ) -> TfeResult<RegistryProviderDocument>;

    async fn read(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<RegistryProviderDocument>;

    async fn delete(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<()>;
}

/// Connection settings for the client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Hostname or base URL of the TFE instance.
    pub address: String,
    /// API token sent as a bearer token.
    pub token: String,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            skip_tls_verify: false,
        }
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Base URL with a scheme and without a trailing slash.
    ///
    /// A bare hostname is assumed to be served over https.
    pub fn base_url(&self) -> TfeResult<String> {
        let address = self.address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(TfeError::Config {
                message: "address must not be empty".to_string(),
            });
        }
        if address.starts_with("https://") || address.starts_with("http://") {
            Ok(address.to_string())
        } else {
            Ok(format!("https://{}", address))
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

/// Handle to the TFE services. Cloning is cheap.
#[derive(Clone)]
pub struct TfeClient {
    gpg: Arc<dyn GpgService>,
    registry_providers: Arc<dyn RegistryProviderService>,
}

impl TfeClient {
    /// Build an HTTP-backed client.
    pub fn new(config: &ClientConfig) -> TfeResult<Self> {
        let backend = Arc::new(HttpBackend::new(config)?);
        Ok(Self {
            gpg: backend.clone(),
            registry_providers: backend,
        })
    }

    /// Build a client from existing service implementations.
    pub fn from_services(
        gpg: Arc<dyn GpgService>,
        registry_providers: Arc<dyn RegistryProviderService>,
    ) -> Self {
        Self {
            gpg,
            registry_providers,
        }
    }

    pub fn gpg(&self) -> &dyn GpgService {
        self.gpg.as_ref()
    }

    pub fn registry_providers(&self) -> &dyn RegistryProviderService {
        self.registry_providers.as_ref()
    }
}

impl fmt::Debug for TfeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TfeClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_adds_scheme() {
        let config = ClientConfig::new("app.terraform.io", "t");
        assert_eq!(config.base_url().unwrap(), "https://app.terraform.io");
    }

    #[test]
    fn test_base_url_keeps_scheme_and_trims_slash() {
        let config = ClientConfig::new("http://localhost:8080/", "t");
        assert_eq!(config.base_url().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_base_url_rejects_empty() {
        let config = ClientConfig::new("  ", "t");
        assert!(matches!(config.base_url(), Err(TfeError::Config { .. })));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("app.terraform.io", "super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
