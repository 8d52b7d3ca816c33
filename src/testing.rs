//! Testing utilities.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without a gRPC server.
//! [`FakeTfe`] is an in-memory TFE that implements the client service traits,
//! so resources can be exercised without network access.
//!
//! # Example
//!
//! ```
//! use tfepatch::testing::{FakeTfe, ProviderTester};
//! use tfepatch::TfeProvider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let fake = FakeTfe::new();
//! let tester = ProviderTester::new(TfeProvider::with_client_factory(fake.factory()).unwrap());
//! tester
//!     .configure(json!({"hostname": "tfe.example.com", "token": "t", "organization": "acme"}))
//!     .await
//!     .unwrap();
//!
//! let state = tester
//!     .lifecycle_create(
//!         "tfepatch_registry_provider",
//!         json!({"organization": "acme", "namespace": "hashicorp", "name": "aws", "registry_name": "public"}),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(state["id"], "hashicorp||aws||public");
//! # });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::schema::ProviderSchema;
use crate::server::ProviderService;
use crate::tfe::{
    ClientConfig, GpgKeyAttributes, GpgKeyDocument, GpgKeyList, GpgKeyRequest, GpgService,
    RegistryName, RegistryProviderDocument, RegistryProviderRequest, RegistryProviderService,
    TfeClient, TfeError, TfeResult,
};
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Full resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration. Error diagnostics become `Err`.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider. Error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a create; the proposed state doubles as the configuration.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh state. `None` means the remote object is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// plan → create → read. Returns the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created)
            .await?
            .ok_or_else(|| TestError::Missing(resource_type.to_string()))
    }

    /// import → read. Returns the state after read.
    pub async fn lifecycle_import(&self, resource_type: &str, id: &str) -> Result<Value, TestError> {
        let imported = self.import_resource(resource_type, id).await?;
        let state = imported
            .into_iter()
            .next()
            .map(|r| r.state)
            .ok_or_else(|| TestError::Missing(resource_type.to_string()))?;
        self.read(resource_type, state)
            .await?
            .ok_or_else(|| TestError::Missing(resource_type.to_string()))
    }

    /// plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        let plan = self.plan_delete(resource_type, current_state.clone()).await?;
        if !plan.planned_state.is_null() {
            return Err(TestError::Unexpected(format!(
                "destroy plan for {} kept state {}",
                resource_type, plan.planned_state
            )));
        }
        self.delete(resource_type, current_state).await?;
        Ok(())
    }
}

/// Error type for test operations.
#[derive(Debug)]
pub enum TestError {
    /// The operation returned error diagnostics.
    Diagnostics(Diagnostics),
    /// The operation failed with a provider error.
    Provider(ProviderError),
    /// A read found no remote object where one was expected.
    Missing(String),
    /// The operation produced an unexpected result.
    Unexpected(String),
}

impl TestError {
    /// The diagnostics carried by the error, converting provider errors.
    pub fn into_diagnostics(self) -> Diagnostics {
        match self {
            TestError::Diagnostics(diags) => diags,
            TestError::Provider(e) => e.into_diagnostics(),
            other => Diagnostics::from(Diagnostic::error(other.to_string())),
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
            TestError::Missing(resource_type) => write!(f, "{} was not found on read", resource_type),
            TestError::Unexpected(msg) => write!(f, "Unexpected result: {}", msg),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Diagnostics) -> Result<(), TestError> {
    let errors: Diagnostics = diagnostics.errors().cloned().collect::<Vec<_>>().into();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates a resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan changes the given attribute.
///
/// # Panics
///
/// Panics if no change has the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &Diagnostics) {
    let errors: Vec<_> = diagnostics.errors().map(|d| &d.summary).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors
    );
}

/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &Diagnostics) {
    assert!(diagnostics.has_errors(), "Expected at least one error, but got none");
}

/// Assert that some error summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &Diagnostics, substring: &str) {
    assert!(
        diagnostics.errors().any(|d| d.summary.contains(substring)),
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics.errors().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error is scoped to `attribute`.
///
/// # Panics
///
/// Panics if no error diagnostic names the attribute.
pub fn assert_error_on_attribute(diagnostics: &Diagnostics, attribute: &str) {
    assert!(
        diagnostics
            .errors()
            .any(|d| d.attribute.as_deref() == Some(attribute)),
        "Expected an error on attribute '{}'. Errors: {:?}",
        attribute,
        diagnostics
            .errors()
            .map(|d| (&d.summary, &d.attribute))
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory TFE
// =========================================================================

const FIRST_KEY_ID: u64 = 0x3296_6F3F_B5AC_1100;

type ProviderKey = (String, RegistryName, String, String);

#[derive(Debug, Default)]
struct FakeState {
    gpg_keys: BTreeMap<(String, String), GpgKeyAttributes>,
    registry_providers: BTreeMap<ProviderKey, RegistryProviderDocument>,
    issued_keys: u64,
    calls: usize,
    fail_status: Option<u16>,
}

impl FakeState {
    /// Count the call and return the injected failure, if any.
    fn begin(&mut self, path: &str) -> TfeResult<()> {
        self.calls += 1;
        match self.fail_status {
            None => Ok(()),
            Some(404) => Err(TfeError::NotFound {
                path: path.to_string(),
            }),
            Some(status @ (401 | 403)) => Err(TfeError::Unauthorized {
                message: format!("injected {}", status),
            }),
            Some(status) => Err(TfeError::Api {
                status,
                message: format!("injected {}", status),
            }),
        }
    }
}

/// An in-memory stand-in for a TFE instance.
///
/// Clones share state. Server-assigned key ids are 16 uppercase hex digits.
#[derive(Debug, Clone, Default)]
pub struct FakeTfe {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTfe {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A client backed by this fake.
    pub fn client(&self) -> TfeClient {
        TfeClient::from_services(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// A client factory for [`TfeProvider::with_client_factory`](crate::TfeProvider::with_client_factory).
    pub fn factory(&self) -> impl Fn(&ClientConfig) -> TfeResult<TfeClient> + Send + Sync + 'static {
        let client = self.client();
        move |_: &ClientConfig| Ok(client.clone())
    }

    /// Fail every following call with the given HTTP status.
    pub fn fail_with_status(&self, status: u16) {
        self.state().fail_status = Some(status);
    }

    pub fn clear_failure(&self) {
        self.state().fail_status = None;
    }

    /// Number of service calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    pub fn gpg_key_count(&self) -> usize {
        self.state().gpg_keys.len()
    }

    pub fn registry_provider_count(&self) -> usize {
        self.state().registry_providers.len()
    }
}

#[async_trait]
impl GpgService for FakeTfe {
    async fn create(&self, request: &GpgKeyRequest) -> TfeResult<GpgKeyDocument> {
        let mut state = self.state();
        state.begin("gpg-keys")?;

        let key_id = format!("{:016X}", FIRST_KEY_ID + state.issued_keys);
        state.issued_keys += 1;

        let attributes = GpgKeyAttributes {
            namespace: request.data.attributes.namespace.clone(),
            ascii_armor: request.data.attributes.ascii_armor.clone(),
            key_id: key_id.clone(),
            created_at: None,
            updated_at: None,
        };
        state
            .gpg_keys
            .insert((attributes.namespace.clone(), key_id), attributes.clone());
        Ok(GpgKeyDocument::from_attributes(attributes))
    }

    async fn read(&self, namespace: &str, key_id: &str) -> TfeResult<GpgKeyDocument> {
        let path = format!("gpg-keys/{}/{}", namespace, key_id);
        let mut state = self.state();
        state.begin(&path)?;

        state
            .gpg_keys
            .get(&(namespace.to_string(), key_id.to_string()))
            .cloned()
            .map(GpgKeyDocument::from_attributes)
            .ok_or(TfeError::NotFound { path })
    }

    async fn delete(&self, namespace: &str, key_id: &str) -> TfeResult<()> {
        let path = format!("gpg-keys/{}/{}", namespace, key_id);
        let mut state = self.state();
        state.begin(&path)?;

        state
            .gpg_keys
            .remove(&(namespace.to_string(), key_id.to_string()))
            .map(|_| ())
            .ok_or(TfeError::NotFound { path })
    }

    async fn list(&self, namespaces: &[String]) -> TfeResult<GpgKeyList> {
        let mut state = self.state();
        state.begin("gpg-keys")?;

        let data = state
            .gpg_keys
            .values()
            .filter(|k| namespaces.contains(&k.namespace))
            .cloned()
            .map(|k| GpgKeyDocument::from_attributes(k).data)
            .collect();
        Ok(GpgKeyList { data })
    }
}

#[async_trait]
impl RegistryProviderService for FakeTfe {
    async fn create(
        &self,
        organization: &str,
        request: &RegistryProviderRequest,
    ) -> TfeResult<RegistryProviderDocument> {
        let mut state = self.state();
        state.begin("registry-providers")?;

        let attrs = &request.data.attributes;
        let key = (
            organization.to_string(),
            attrs.registry_name,
            attrs.namespace.clone(),
            attrs.name.clone(),
        );
        if state.registry_providers.contains_key(&key) {
            return Err(TfeError::Api {
                status: 422,
                message: "Name has already been taken".to_string(),
            });
        }

        let mut document = request.clone();
        document.data.id = Some(format!("prov-{}", state.registry_providers.len() + 1));
        state.registry_providers.insert(key, document.clone());
        Ok(document)
    }

    async fn read(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<RegistryProviderDocument> {
        let path = format!("registry-providers/{}/{}/{}", registry_name, namespace, name);
        let mut state = self.state();
        state.begin(&path)?;

        let key = (
            organization.to_string(),
            registry_name,
            namespace.to_string(),
            name.to_string(),
        );
        state
            .registry_providers
            .get(&key)
            .cloned()
            .ok_or(TfeError::NotFound { path })
    }

    async fn delete(
        &self,
        organization: &str,
        registry_name: RegistryName,
        namespace: &str,
        name: &str,
    ) -> TfeResult<()> {
        let path = format!("registry-providers/{}/{}/{}", registry_name, namespace, name);
        let mut state = self.state();
        state.begin(&path)?;

        let key = (
            organization.to_string(),
            registry_name,
            namespace.to_string(),
            name.to_string(),
        );
        state
            .registry_providers
            .remove(&key)
            .map(|_| ())
            .ok_or(TfeError::NotFound { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeChange;
    use serde_json::json;

    #[tokio::test]
    async fn test_fake_assigns_sequential_key_ids() {
        let fake = FakeTfe::new();
        let client = fake.client();

        let first = client
            .gpg()
            .create(&GpgKeyRequest::new("acme", "K1"))
            .await
            .unwrap();
        let second = client
            .gpg()
            .create(&GpgKeyRequest::new("acme", "K2"))
            .await
            .unwrap();

        assert_eq!(first.data.attributes.key_id, "32966F3FB5AC1100");
        assert_eq!(second.data.attributes.key_id, "32966F3FB5AC1101");
        assert_eq!(fake.gpg_key_count(), 2);
    }

    #[tokio::test]
    async fn test_fake_list_filters_by_namespace() {
        let fake = FakeTfe::new();
        let client = fake.client();
        client.gpg().create(&GpgKeyRequest::new("acme", "K1")).await.unwrap();
        client.gpg().create(&GpgKeyRequest::new("other", "K2")).await.unwrap();

        let list = client.gpg().list(&["acme".to_string()]).await.unwrap();
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.data[0].attributes.namespace, "acme");
    }

    #[tokio::test]
    async fn test_fake_injected_failure() {
        let fake = FakeTfe::new();
        let client = fake.client();

        fake.fail_with_status(404);
        let err = client
            .registry_providers()
            .read("acme", RegistryName::Public, "hashicorp", "aws")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        fake.fail_with_status(500);
        let err = client.gpg().list(&[]).await.unwrap_err();
        assert!(matches!(err, TfeError::Api { status: 500, .. }));

        fake.clear_failure();
        assert!(client.gpg().list(&[]).await.is_ok());
        assert_eq!(fake.call_count(), 3);
    }

    #[test]
    fn test_check_diagnostics_keeps_errors_only() {
        let diags = Diagnostics::from(vec![
            Diagnostic::warning("careful"),
            Diagnostic::error("broken").with_attribute("namespace"),
        ]);

        match check_diagnostics(diags) {
            Err(TestError::Diagnostics(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_error_on_attribute(&errors, "namespace");
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(check_diagnostics(Diagnostics::from(Diagnostic::warning("ok"))).is_ok());
    }

    #[test]
    fn test_plan_assertions() {
        let create = PlanResult::with_changes(
            json!({"name": "aws"}),
            vec![AttributeChange::added("name", json!("aws"))],
        );
        assert_plan_creates(&create);
        assert_plan_changes_attribute(&create, "name");

        let replace = PlanResult::with_changes(
            json!({"name": "gcp"}),
            vec![AttributeChange::modified("name", json!("aws"), json!("gcp")).forcing_replace()],
        );
        assert_plan_replaces(&replace);

        assert_plan_no_changes(&PlanResult::no_change(json!({})));
    }

    #[test]
    #[should_panic(expected = "Expected at least one error")]
    fn test_assert_has_errors_panics() {
        assert_has_errors(&Diagnostics::new());
    }

    #[test]
    fn test_error_display() {
        let err = TestError::Diagnostics(Diagnostics::from(
            Diagnostic::error("Invalid value").with_attribute("registry_name"),
        ));
        let display = err.to_string();
        assert!(display.contains("1 diagnostic(s)"));
        assert!(display.contains("(at registry_name)"));

        assert_no_errors(&Diagnostics::from(Diagnostic::warning("fine")));
        assert_error_contains(&err.into_diagnostics(), "Invalid");
    }
}
