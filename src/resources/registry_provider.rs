//! `tfepatch_registry_provider`: a provider entry in an organization's registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::composite_id;
use crate::diagnostic::Diagnostics;
use crate::error::ProviderError;
use crate::resource::{reject_separator, require, Capability, ClientSlot, ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::tfe::{RegistryName, RegistryProviderAttributes, RegistryProviderRequest};
use crate::validation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProviderModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub registry_name: Option<String>,
}

/// Lookup key shared by read and delete.
struct ProviderKey<'a> {
    organization: &'a str,
    registry_name: RegistryName,
    namespace: &'a str,
    name: &'a str,
}

impl RegistryProviderModel {
    /// Imported state carries no organization; the provider default fills in.
    fn key<'a>(&'a self, default_organization: &'a str) -> Result<ProviderKey<'a>, ProviderError> {
        let organization = match self.organization.as_deref() {
            Some(org) if !org.is_empty() => org,
            _ if !default_organization.is_empty() => default_organization,
            _ => return Err(ProviderError::Validation(
                "attribute 'organization' is not set".to_string(),
            )),
        };
        Ok(ProviderKey {
            organization,
            registry_name: parse_registry_name(require("registry_name", &self.registry_name)?)?,
            namespace: require("namespace", &self.namespace)?,
            name: require("name", &self.name)?,
        })
    }

    fn refresh(self, remote: RegistryProviderAttributes, default_organization: &str) -> Self {
        let registry_name = remote.registry_name.as_str();
        Self {
            id: Some(composite_id::join(&[
                &remote.namespace,
                &remote.name,
                registry_name,
            ])),
            organization: self
                .organization
                .or_else(|| Some(default_organization.to_string())),
            namespace: Some(remote.namespace),
            name: Some(remote.name),
            registry_name: Some(registry_name.to_string()),
        }
    }
}

fn parse_registry_name(value: &str) -> Result<RegistryName, ProviderError> {
    value
        .parse::<RegistryName>()
        .map_err(|e| ProviderError::Validation(e.to_string()))
}

#[derive(Debug, Default)]
pub struct RegistryProviderResource {
    data: ClientSlot,
}

impl RegistryProviderResource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Resource for RegistryProviderResource {
    fn type_suffix(&self) -> &'static str {
        "registry_provider"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A provider published in the public or private registry of an organization")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Unique id for this resource"),
            )
            .with_attribute(
                "organization",
                Attribute::required_string()
                    .with_description("The organization that owns the registry")
                    .with_force_new(),
            )
            .with_attribute(
                "namespace",
                Attribute::required_string()
                    .with_description(
                        "The namespace of the provider. For private providers this is the organization name",
                    )
                    .with_force_new(),
            )
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("The name of the provider")
                    .with_force_new(),
            )
            .with_attribute(
                "registry_name",
                Attribute::required_string()
                    .with_description("Whether the provider is in the public or private registry")
                    .with_force_new()
                    .one_of(RegistryName::VALUES),
            )
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Configure, Capability::ImportState]
    }

    fn configure(&self, data: ProviderData) {
        self.data.set(data);
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diagnostics = validation::validate(&self.schema(), config);
        reject_separator(config, &["namespace", "name"], &mut diagnostics);
        diagnostics
    }

    #[instrument(skip_all, name = "registry_provider.create")]
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        let data = self.data.get()?;
        let mut plan: RegistryProviderModel = serde_json::from_value(planned_state)?;
        let key = plan.key(&data.organization)?;

        let created = data
            .client
            .registry_providers()
            .create(
                key.organization,
                &RegistryProviderRequest::new(key.namespace, key.name, key.registry_name),
            )
            .await
            .map_err(|e| ProviderError::remote("creating", e))?
            .data
            .attributes;

        info!(
            organization = key.organization,
            namespace = %created.namespace,
            name = %created.name,
            registry_name = %created.registry_name,
            "created registry provider"
        );
        plan.id = Some(composite_id::join(&[
            &created.namespace,
            &created.name,
            created.registry_name.as_str(),
        ]));
        Ok(serde_json::to_value(plan)?)
    }

    #[instrument(skip_all, name = "registry_provider.read")]
    async fn read(&self, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let data = self.data.get()?;
        let state: RegistryProviderModel = serde_json::from_value(current_state)?;
        let key = state.key(&data.organization)?;

        let result = data
            .client
            .registry_providers()
            .read(key.organization, key.registry_name, key.namespace, key.name)
            .await;
        let remote = match result {
            Ok(doc) => doc.data.attributes,
            Err(e) if e.is_not_found() => {
                warn!(
                    namespace = key.namespace,
                    name = key.name,
                    "registry provider no longer exists, removing from state"
                );
                return Ok(None);
            },
            Err(e) => return Err(ProviderError::remote("reading", e)),
        };

        Ok(Some(serde_json::to_value(state.refresh(remote, &data.organization))?))
    }

    #[instrument(skip_all, name = "registry_provider.delete")]
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError> {
        let data = self.data.get()?;
        let state: RegistryProviderModel = serde_json::from_value(current_state)?;
        let key = state.key(&data.organization)?;

        let result = data
            .client
            .registry_providers()
            .delete(key.organization, key.registry_name, key.namespace, key.name)
            .await;
        match result {
            Ok(()) => {
                info!(namespace = key.namespace, name = key.name, "deleted registry provider");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                warn!(namespace = key.namespace, name = key.name, "registry provider already deleted");
                Ok(())
            },
            Err(e) => Err(ProviderError::remote("deleting", e)),
        }
    }

    fn import_state(&self, id: &str) -> Result<Value, ProviderError> {
        let [namespace, name, registry_name] = composite_id::split::<3>(id)?;
        let registry_name = parse_registry_name(registry_name)?;

        let state = RegistryProviderModel {
            id: Some(id.to_string()),
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            registry_name: Some(registry_name.to_string()),
            ..Default::default()
        };
        Ok(serde_json::to_value(state)?)
    }
}
