//! `tfepatch_gpg_key`: a GPG public key in the private registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::composite_id;
use crate::diagnostic::Diagnostics;
use crate::error::ProviderError;
use crate::resource::{reject_separator, require, Capability, ClientSlot, ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::tfe::{GpgKeyAttributes, GpgKeyRequest};
use crate::validation;

/// State of a GPG key resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpgKeyModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
}

impl GpgKeyModel {
    /// Overwrite server-owned fields, keeping organization from state.
    fn refresh(self, remote: GpgKeyAttributes, default_organization: &str) -> Self {
        Self {
            id: Some(composite_id::join(&[&remote.namespace, &remote.key_id])),
            organization: self
                .organization
                .or_else(|| Some(default_organization.to_string())),
            namespace: Some(remote.namespace),
            public_key: Some(remote.ascii_armor),
            key_id: Some(remote.key_id),
        }
    }
}

#[derive(Debug, Default)]
pub struct GpgKeyResource {
    data: ClientSlot,
}

impl GpgKeyResource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Resource for GpgKeyResource {
    fn type_suffix(&self) -> &'static str {
        "gpg_key"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A GPG public key used to verify provider releases in the private registry")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Unique id for this resource"),
            )
            .with_attribute(
                "key_id",
                Attribute::computed_string().with_description("The identity of the generated key"),
            )
            .with_attribute(
                "organization",
                Attribute::required_string()
                    .with_description("The organization name under which this GPG key will exist")
                    .with_force_new(),
            )
            .with_attribute(
                "namespace",
                Attribute::required_string()
                    .with_description("The provider, by namespace, that this GPG key is affiliated with")
                    .with_force_new(),
            )
            .with_attribute(
                "public_key",
                Attribute::required_string()
                    .with_description("The ASCII-armored public GPG key")
                    .with_force_new(),
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
        reject_separator(config, &["namespace"], &mut diagnostics);
        diagnostics
    }

    #[instrument(skip_all, name = "gpg_key.create")]
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        let data = self.data.get()?;
        let mut plan: GpgKeyModel = serde_json::from_value(planned_state)?;
        let namespace = require("namespace", &plan.namespace)?;
        let public_key = require("public_key", &plan.public_key)?;

        let created = data
            .client
            .gpg()
            .create(&GpgKeyRequest::new(namespace, public_key))
            .await
            .map_err(|e| ProviderError::remote("creating", e))?
            .data
            .attributes;

        info!(namespace = %created.namespace, key_id = %created.key_id, "created GPG key");
        plan.id = Some(composite_id::join(&[&created.namespace, &created.key_id]));
        plan.key_id = Some(created.key_id);
        Ok(serde_json::to_value(plan)?)
    }

    #[instrument(skip_all, name = "gpg_key.read")]
    async fn read(&self, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let data = self.data.get()?;
        let state: GpgKeyModel = serde_json::from_value(current_state)?;
        let namespace = require("namespace", &state.namespace)?;
        let key_id = require("key_id", &state.key_id)?;

        let remote = match data.client.gpg().read(namespace, key_id).await {
            Ok(doc) => doc.data.attributes,
            Err(e) if e.is_not_found() => {
                warn!(namespace, key_id, "GPG key no longer exists, removing from state");
                return Ok(None);
            },
            Err(e) => return Err(ProviderError::remote("reading", e)),
        };

        Ok(Some(serde_json::to_value(state.refresh(remote, &data.organization))?))
    }

    #[instrument(skip_all, name = "gpg_key.delete")]
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError> {
        let data = self.data.get()?;
        let state: GpgKeyModel = serde_json::from_value(current_state)?;
        let namespace = require("namespace", &state.namespace)?;
        let key_id = require("key_id", &state.key_id)?;

        match data.client.gpg().delete(namespace, key_id).await {
            Ok(()) => {
                info!(namespace, key_id, "deleted GPG key");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                warn!(namespace, key_id, "GPG key already deleted");
                Ok(())
            },
            Err(e) => Err(ProviderError::remote("deleting", e)),
        }
    }

    fn import_state(&self, id: &str) -> Result<Value, ProviderError> {
        let [namespace, key_id] = composite_id::split::<2>(id)?;
        let state = GpgKeyModel {
            id: Some(id.to_string()),
            namespace: Some(namespace.to_string()),
            key_id: Some(key_id.to_string()),
            ..Default::default()
        };
        Ok(serde_json::to_value(state)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTfe;
    use serde_json::json;

    const KEY: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----\nmQINBGRkZmYBEAC\n-----END PGP PUBLIC KEY BLOCK-----";

    fn configured(fake: &FakeTfe) -> GpgKeyResource {
        let resource = GpgKeyResource::new();
        resource.configure(ProviderData::new(fake.client(), "acme"));
        resource
    }

    #[tokio::test]
    async fn test_create_sets_composite_id() {
        let fake = FakeTfe::new();
        let resource = configured(&fake);

        let state = resource
            .create(json!({"organization": "acme", "namespace": "Acme", "public_key": KEY}))
            .await
            .unwrap();

        let key_id = state["key_id"].as_str().unwrap().to_string();
        assert_eq!(
            state["id"],
            format!("{}||{}", "acme", key_id.to_lowercase())
        );
        assert_eq!(state["organization"], "acme");
        assert_eq!(state["public_key"], KEY);
    }

    #[tokio::test]
    async fn test_read_preserves_organization() {
        let fake = FakeTfe::new();
        let resource = configured(&fake);
        let created = resource
            .create(json!({"organization": "acme", "namespace": "acme", "public_key": KEY}))
            .await
            .unwrap();

        let mut stale = created.clone();
        stale["public_key"] = json!("drifted");
        let state = resource.read(stale).await.unwrap().unwrap();

        assert_eq!(state, created);
    }

    #[tokio::test]
    async fn test_read_missing_key_removes_state() {
        let fake = FakeTfe::new();
        let resource = configured(&fake);

        let state = resource
            .read(json!({"namespace": "acme", "key_id": "DEADBEEF"}))
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_read_other_errors_are_generic() {
        let fake = FakeTfe::new();
        let resource = configured(&fake);
        fake.fail_with_status(503);

        let err = resource
            .read(json!({"namespace": "acme", "key_id": "DEADBEEF"}))
            .await
            .unwrap_err();
        let diags = err.into_diagnostics();
        assert_eq!(diags.as_slice()[0].summary, "Error reading resource");
    }

    #[tokio::test]
    async fn test_delete_removes_key() {
        let fake = FakeTfe::new();
        let resource = configured(&fake);
        let created = resource
            .create(json!({"organization": "acme", "namespace": "acme", "public_key": KEY}))
            .await
            .unwrap();

        resource.delete(created.clone()).await.unwrap();
        assert!(resource.read(created).await.unwrap().is_none());
    }

    #[test]
    fn test_import_state() {
        let resource = GpgKeyResource::new();
        let state = resource.import_state("acme||32966F3FB5AC1129").unwrap();

        assert_eq!(state["namespace"], "acme");
        assert_eq!(state["key_id"], "32966F3FB5AC1129");
        assert_eq!(state["id"], "acme||32966F3FB5AC1129");
        assert!(state["public_key"].is_null());
    }

    #[test]
    fn test_import_rejects_malformed_id() {
        let resource = GpgKeyResource::new();
        assert!(matches!(
            resource.import_state("acme"),
            Err(ProviderError::ImportId(_))
        ));
    }

    #[test]
    fn test_validate_rejects_separator_in_namespace() {
        let resource = GpgKeyResource::new();
        let diags = resource.validate(&json!({
            "organization": "acme",
            "namespace": "ac||me",
            "public_key": KEY
        }));
        assert!(diags.has_errors());
        assert_eq!(diags.as_slice()[0].attribute.as_deref(), Some("namespace"));
    }

    #[tokio::test]
    async fn test_unconfigured_resource_fails() {
        let resource = GpgKeyResource::new();
        let err = resource
            .create(json!({"organization": "acme", "namespace": "acme", "public_key": KEY}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
