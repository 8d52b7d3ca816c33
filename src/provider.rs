//! The tfepatch provider: configuration, client construction and dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resource::{ProviderData, Resource, ResourceRegistry};
use crate::resources::{GpgKeyResource, RegistryProviderResource};
use crate::schema::{Attribute, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::tfe::{ClientConfig, TfeClient, TfeResult};
use crate::types::{is_unknown, ImportedResource, PlanResult, PROVIDER_TYPE_NAME};
use crate::validation;

/// Builds the API client from the provider configuration.
pub type ClientFactory = Arc<dyn Fn(&ClientConfig) -> TfeResult<TfeClient> + Send + Sync>;

/// The provider configuration block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub ssl_skip_verify: Option<bool>,
}

/// Attributes that must be known before a client can be built, with the
/// summary reported when they are not.
const MUST_BE_KNOWN: [(&str, &str, &str); 4] = [
    (
        "hostname",
        "Unknown Terraform Enterprise API Host",
        "API host",
    ),
    (
        "token",
        "Unknown Terraform Enterprise API Token",
        "API token",
    ),
    (
        "organization",
        "Unknown Terraform Enterprise Organization",
        "organization",
    ),
    (
        "ssl_skip_verify",
        "Unknown Terraform Enterprise TLS Setting",
        "TLS verification setting",
    ),
];

pub struct TfeProvider {
    resources: ResourceRegistry,
    client_factory: ClientFactory,
}

impl TfeProvider {
    /// A provider that talks to TFE over HTTP.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_client_factory(TfeClient::new)
    }

    /// A provider whose client is built by `factory`.
    pub fn with_client_factory<F>(factory: F) -> Result<Self, ProviderError>
    where
        F: Fn(&ClientConfig) -> TfeResult<TfeClient> + Send + Sync + 'static,
    {
        let mut resources = ResourceRegistry::new(PROVIDER_TYPE_NAME);
        resources.register(Arc::new(GpgKeyResource::new()))?;
        resources.register(Arc::new(RegistryProviderResource::new()))?;

        Ok(Self {
            resources,
            client_factory: Arc::new(factory),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.resources
    }

    fn provider_schema() -> Schema {
        Schema::v0()
            .with_description(
                "Patches Terraform Enterprise resources that the official provider does not manage yet",
            )
            .with_attribute(
                "hostname",
                Attribute::required_string()
                    .with_description("The Terraform Enterprise hostname to connect to, e.g. app.terraform.io"),
            )
            .with_attribute(
                "token",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The token used to authenticate with Terraform Enterprise"),
            )
            .with_attribute(
                "organization",
                Attribute::required_string()
                    .with_description("The organization to apply to a resource if one is not defined on the resource itself"),
            )
            .with_attribute(
                "ssl_skip_verify",
                Attribute::optional_bool().with_description("Whether or not to skip certificate verification"),
            )
    }

    fn resource(&self, resource_type: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources.get(resource_type)
    }
}

fn unknown_attributes(config: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for (attribute, summary, what) in MUST_BE_KNOWN {
        if config.get(attribute).is_some_and(is_unknown) {
            diagnostics.push(
                Diagnostic::error(summary)
                    .with_detail(format!(
                        "The provider cannot create the Terraform Enterprise API client as there is an \
                         unknown configuration value for the {}. Set the value statically in the configuration.",
                        what
                    ))
                    .with_attribute(attribute),
            );
        }
    }
    diagnostics
}

#[async_trait]
impl ProviderService for TfeProvider {
    fn schema(&self) -> ProviderSchema {
        self.resources.iter().fold(
            ProviderSchema::new().with_provider_config(Self::provider_schema()),
            |schema, (type_name, resource)| schema.with_resource(type_name.clone(), resource.schema()),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Diagnostics, ProviderError> {
        Ok(validation::validate(&Self::provider_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Diagnostics, ProviderError> {
        info!("Configuring TFE client");

        let mut diagnostics = validation::validate(&Self::provider_schema(), &config);
        diagnostics.extend(unknown_attributes(&config));
        if diagnostics.has_errors() {
            return Ok(diagnostics);
        }

        let config: ProviderConfig = serde_json::from_value(config)?;
        let skip_tls_verify = config.ssl_skip_verify.unwrap_or(false);
        if skip_tls_verify {
            warn!("Client configured to skip certificate verification");
        }

        let client_config = ClientConfig::new(
            config.hostname.unwrap_or_default(),
            config.token.unwrap_or_default(),
        )
        .with_skip_tls_verify(skip_tls_verify);

        let client = match (self.client_factory)(&client_config) {
            Ok(client) => client,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Unable to configure a new TFE API client")
                        .with_detail(e.to_string()),
                );
                return Ok(diagnostics);
            },
        };

        let organization = config.organization.unwrap_or_default();
        info!(
            address = %client_config.address,
            organization = %organization,
            "TFE client configured"
        );
        self.resources
            .configure_all(&ProviderData::new(client, organization));
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Diagnostics, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;

        if !proposed_state.is_null() {
            let to_validate = if config.is_null() { &proposed_state } else { &config };
            let diagnostics = resource.validate(to_validate);
            if diagnostics.has_errors() {
                debug!(resource_type, "plan rejected by validation");
                return Err(diagnostics.into());
            }
        }

        Ok(plan_resource(
            &resource.schema(),
            prior_state.as_ref(),
            &proposed_state,
        ))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.create(planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.resource(resource_type)?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type)?.delete(current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self.resource(resource_type)?.import_state(id)?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTfe;
    use crate::tfe::TfeError;
    use crate::types::unknown;
    use serde_json::json;

    fn config() -> Value {
        json!({
            "hostname": "tfe.example.com",
            "token": "secret",
            "organization": "acme"
        })
    }

    #[test]
    fn test_schema_lists_both_resources() {
        let provider = TfeProvider::new().unwrap();
        let schema = provider.schema();

        assert!(schema.resources.contains_key("tfepatch_gpg_key"));
        assert!(schema.resources.contains_key("tfepatch_registry_provider"));
        assert!(schema.provider.attribute("token").unwrap().flags.sensitive);

        let metadata = provider.metadata();
        assert_eq!(metadata.type_name, "tfepatch");
        assert_eq!(
            metadata.resources,
            vec!["tfepatch_gpg_key", "tfepatch_registry_provider"]
        );
    }

    #[tokio::test]
    async fn test_configure_passes_settings_to_factory() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let fake = FakeTfe::new();
        let provider = {
            let seen = Arc::clone(&seen);
            let client = fake.client();
            TfeProvider::with_client_factory(move |config: &ClientConfig| {
                *seen.lock().unwrap() = Some(config.clone());
                Ok(client.clone())
            })
            .unwrap()
        };

        let mut cfg = config();
        cfg["ssl_skip_verify"] = json!(true);
        let diags = provider.configure(cfg).await.unwrap();
        assert!(diags.is_empty());

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.address, "tfe.example.com");
        assert_eq!(seen.token, "secret");
        assert!(seen.skip_tls_verify);
    }

    #[tokio::test]
    async fn test_configure_reports_each_unknown_attribute() {
        let fake = FakeTfe::new();
        let provider = TfeProvider::with_client_factory(fake.factory()).unwrap();

        let diags = provider
            .configure(json!({
                "hostname": unknown(),
                "token": "secret",
                "organization": unknown()
            }))
            .await
            .unwrap();

        let attributes: Vec<_> = diags
            .iter()
            .map(|d| d.attribute.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(attributes, vec!["hostname", "organization"]);
        assert_eq!(
            diags.as_slice()[0].summary,
            "Unknown Terraform Enterprise API Host"
        );
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_configure_factory_error_is_diagnostic() {
        let provider = TfeProvider::with_client_factory(|_: &ClientConfig| {
            Err(TfeError::Config {
                message: "bad address".to_string(),
            })
        })
        .unwrap();

        let diags = provider.configure(config()).await.unwrap();
        assert!(diags.has_errors());
        assert_eq!(
            diags.as_slice()[0].summary,
            "Unable to configure a new TFE API client"
        );
        assert!(diags.as_slice()[0]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("bad address"));
    }

    #[tokio::test]
    async fn test_configure_missing_required() {
        let fake = FakeTfe::new();
        let provider = TfeProvider::with_client_factory(fake.factory()).unwrap();

        let diags = provider
            .configure(json!({"hostname": "tfe.example.com"}))
            .await
            .unwrap();
        assert_eq!(diags.errors().count(), 2);
    }

    #[tokio::test]
    async fn test_operations_before_configure_fail() {
        let provider = TfeProvider::new().unwrap();
        let err = provider
            .read("tfepatch_gpg_key", json!({"namespace": "acme", "key_id": "ABC"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = TfeProvider::new().unwrap();
        let err = provider
            .validate_resource_config("tfepatch_workspace", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_registry_name() {
        let provider = TfeProvider::new().unwrap();
        let proposed = json!({
            "organization": "acme",
            "namespace": "hashicorp",
            "name": "aws",
            "registry_name": "internal"
        });

        let err = provider
            .plan("tfepatch_registry_provider", None, proposed.clone(), proposed)
            .await
            .unwrap_err();
        let diags = err.into_diagnostics();
        assert_eq!(diags.as_slice()[0].attribute.as_deref(), Some("registry_name"));
    }

    #[tokio::test]
    async fn test_plan_destroy_skips_validation() {
        let provider = TfeProvider::new().unwrap();
        let prior = json!({
            "id": "hashicorp||aws||public",
            "organization": "acme",
            "namespace": "hashicorp",
            "name": "aws",
            "registry_name": "public"
        });

        let plan = provider
            .plan("tfepatch_registry_provider", Some(prior), Value::Null, Value::Null)
            .await
            .unwrap();
        assert!(plan.planned_state.is_null());
    }

    #[tokio::test]
    async fn test_import_wraps_state() {
        let provider = TfeProvider::new().unwrap();
        let imported = provider
            .import_resource("tfepatch_gpg_key", "acme||ABCDEF")
            .await
            .unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "tfepatch_gpg_key");
        assert_eq!(imported[0].state["key_id"], "ABCDEF");
    }
}
