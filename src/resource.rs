//! The resource abstraction and the registry the provider dispatches through.
//!
//! Every resource must declare the [`Capability`] set it provides. The
//! registry refuses resources that lack one of [`REQUIRED_CAPABILITIES`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::composite_id;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::tfe::TfeClient;
use crate::types::is_unknown;
use crate::validation;

/// Optional behaviors a resource can provide beyond CRUD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Accepts the API client during provider configuration.
    Configure,
    /// Can be imported from an id string.
    ImportState,
}

/// Capabilities every resource in this provider must provide.
pub const REQUIRED_CAPABILITIES: [Capability; 2] = [Capability::Configure, Capability::ImportState];

/// A resource type managed by the provider.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name suffix, e.g. `gpg_key`. The registry prefixes the provider name.
    fn type_suffix(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// The capabilities this resource provides.
    fn capabilities(&self) -> &'static [Capability];

    /// Receive the API client built during provider configuration.
    fn configure(&self, data: ProviderData);

    /// Validate a resource configuration.
    fn validate(&self, config: &Value) -> Diagnostics {
        validation::validate(&self.schema(), config)
    }

    /// Create the remote object and return the new state.
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh state. `None` means the remote object no longer exists.
    async fn read(&self, current_state: Value) -> Result<Option<Value>, ProviderError>;

    /// Every attribute forces replacement, so update keeps the planned state.
    async fn update(&self, _prior_state: Value, planned_state: Value) -> Result<Value, ProviderError> {
        Ok(planned_state)
    }

    /// Delete the remote object.
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError>;

    /// Turn an import id into a partial state that a subsequent read completes.
    fn import_state(&self, id: &str) -> Result<Value, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "import is not supported by {}",
            self.type_suffix()
        )))
    }
}

/// What a resource receives when the provider is configured.
#[derive(Debug, Clone)]
pub struct ProviderData {
    pub client: TfeClient,
    /// Organization used when a resource's state does not name one.
    pub organization: String,
}

impl ProviderData {
    pub fn new(client: TfeClient, organization: impl Into<String>) -> Self {
        Self {
            client,
            organization: organization.into(),
        }
    }
}

/// Holds the provider data handed to a resource at configure time.
#[derive(Debug, Default)]
pub struct ClientSlot(RwLock<Option<ProviderData>>);

impl ClientSlot {
    pub fn set(&self, data: ProviderData) {
        match self.0.write() {
            Ok(mut slot) => *slot = Some(data),
            Err(poisoned) => *poisoned.into_inner() = Some(data),
        }
    }

    /// The configured provider data, or a configuration error.
    pub fn get(&self) -> Result<ProviderData, ProviderError> {
        let slot = match self.0.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        (*slot)
            .clone()
            .ok_or_else(|| ProviderError::Configuration("provider not configured".to_string()))
    }
}

/// Resources keyed by full type name.
pub struct ResourceRegistry {
    provider_type_name: &'static str,
    resources: BTreeMap<String, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    pub fn new(provider_type_name: &'static str) -> Self {
        Self {
            provider_type_name,
            resources: BTreeMap::new(),
        }
    }

    /// Register a resource after checking its capability set.
    pub fn register(&mut self, resource: Arc<dyn Resource>) -> Result<(), ProviderError> {
        let type_name = format!("{}_{}", self.provider_type_name, resource.type_suffix());

        let provided = resource.capabilities();
        if let Some(missing) = REQUIRED_CAPABILITIES
            .iter()
            .find(|c| !provided.contains(*c))
        {
            return Err(ProviderError::MissingCapability {
                resource_type: type_name,
                capability: *missing,
            });
        }

        debug!(resource_type = %type_name, "registered resource");
        self.resources.insert(type_name, resource);
        Ok(())
    }

    /// Look up a resource by full type name.
    pub fn get(&self, resource_type: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// Full type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Resource>)> {
        self.resources.iter()
    }

    /// Hand the provider data to every resource that accepts it.
    pub fn configure_all(&self, data: &ProviderData) {
        for resource in self.resources.values() {
            if resource.capabilities().contains(&Capability::Configure) {
                resource.configure(data.clone());
            }
        }
    }
}

/// Pull a required string field out of a resource model.
pub(crate) fn require<'a>(
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, ProviderError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Validation(format!("attribute '{}' is not set", field)))
}

/// Reject key fields that contain the composite id separator.
pub(crate) fn reject_separator(config: &Value, fields: &[&str], diagnostics: &mut Diagnostics) {
    for field in fields {
        let Some(value) = config.get(*field).filter(|v| !is_unknown(v)) else {
            continue;
        };
        if value.as_str().is_some_and(composite_id::contains_separator) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", field))
                    .with_detail(format!(
                        "The value must not contain '{}'",
                        composite_id::SEPARATOR
                    ))
                    .with_attribute(*field),
            );
        }
    }
}
