//! The plugin protocol service and the functions that serve it.
//!
//! [`ProviderService`] is the high-level trait a provider implements.
//! [`ProviderGrpcService`] adapts it to the generated gRPC trait, and
//! [`serve`] binds a listener, prints the handshake and runs until a
//! shutdown signal arrives.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests, bounded by [`ServeOptions::shutdown_timeout`]
//! 3. Calls [`ProviderService::stop`]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::diagnostic::{DiagnosticSeverity, Diagnostics};
use crate::error::ProviderError;
use crate::generated as pb;
use crate::schema::{ProviderSchema, Schema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
    PROVIDER_ADDRESS, PROVIDER_TYPE_NAME,
};

/// Environment variable that pins the listen address.
pub const LISTEN_ADDR_ENV: &str = "TFEPATCH_LISTEN_ADDR";

/// Operations the plugin protocol dispatches to a provider.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// The provider configuration schema and every resource schema.
    fn schema(&self) -> ProviderSchema;

    /// Type name and resource names, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: PROVIDER_TYPE_NAME.to_string(),
            resources: self.schema().resources.keys().cloned().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    async fn validate_provider_config(&self, config: Value) -> Result<Diagnostics, ProviderError> {
        let _ = config;
        Ok(Diagnostics::new())
    }

    /// Configure the provider. Returned diagnostics may carry warnings.
    async fn configure(&self, config: Value) -> Result<Diagnostics, ProviderError>;

    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Diagnostics, ProviderError>;

    /// Upgrade state written by an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan a change. `prior_state = None` is a create, a null proposed state a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh a resource. `None` means it no longer exists.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;
}

/// Adapter from [`ProviderService`] to the generated gRPC service.
pub struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

impl<P: ProviderService> ProviderGrpcService<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Wrap the adapter in the generated tonic server type.
    pub fn into_server(self) -> pb::provider_server::ProviderServer<Self> {
        pb::provider_server::ProviderServer::new(self)
    }
}

fn diagnostics_to_proto(diagnostics: Diagnostics) -> Vec<pb::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| pb::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => pb::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => pb::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_proto(err: ProviderError) -> Vec<pb::Diagnostic> {
    diagnostics_to_proto(err.into_diagnostics())
}

fn schema_to_proto(schema: &Schema) -> Result<pb::Schema, ProviderError> {
    let attributes = schema
        .attributes
        .iter()
        .map(|(name, attr)| -> Result<pb::Attribute, ProviderError> {
            Ok(pb::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type)?,
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                allowed_values: attr.allowed_values.clone(),
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(pb::Schema {
        version: schema.version as i64,
        attributes,
        description: schema.description.clone().unwrap_or_default(),
    })
}

/// Decode a JSON payload. An empty payload decodes to `null`.
fn decode(bytes: &[u8], field: &str) -> Result<Value, Status> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| Status::invalid_argument(format!("{} is not valid JSON: {}", field, e)))
}

fn encode(value: &Value) -> Result<Vec<u8>, Status> {
    serde_json::to_vec(value).map_err(|e| ProviderError::from(e).into())
}

fn log_diagnostics(operation: &str, diagnostics: &Diagnostics) {
    if diagnostics.has_errors() {
        warn!(operation, diagnostics = diagnostics.len(), "completed with errors");
    } else {
        debug!(operation, "completed");
    }
}

#[tonic::async_trait]
impl<P: ProviderService> pb::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<pb::GetMetadataRequest>,
    ) -> Result<Response<pb::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        debug!(resources = metadata.resources.len(), "GetMetadata completed");
        Ok(Response::new(pb::GetMetadataResponse {
            type_name: metadata.type_name,
            resources: metadata.resources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<pb::GetSchemaRequest>,
    ) -> Result<Response<pb::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        let resources: HashMap<String, pb::Schema> = schema
            .resources
            .iter()
            .map(|(name, s)| Ok::<_, ProviderError>((name.clone(), schema_to_proto(s)?)))
            .collect::<Result<_, _>>()?;

        debug!(resources = schema.resources.len(), "GetSchema completed");
        Ok(Response::new(pb::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)?),
            resources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<pb::ValidateProviderConfigRequest>,
    ) -> Result<Response<pb::ValidateProviderConfigResponse>, Status> {
        let config = decode(&request.into_inner().config, "config")?;

        let diagnostics = match self.provider.validate_provider_config(config).await {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                e.into_diagnostics()
            },
        };
        log_diagnostics("ValidateProviderConfig", &diagnostics);
        Ok(Response::new(pb::ValidateProviderConfigResponse {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<pb::ConfigureRequest>,
    ) -> Result<Response<pb::ConfigureResponse>, Status> {
        let config = decode(&request.into_inner().config, "config")?;

        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                error!(error = %e, "Configure failed");
                e.into_diagnostics()
            },
        };
        log_diagnostics("Configure", &diagnostics);
        Ok(Response::new(pb::ConfigureResponse {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<pb::StopRequest>,
    ) -> Result<Response<pb::StopResponse>, Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(Response::new(pb::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type = tracing::field::Empty))]
    async fn validate_resource_config(
        &self,
        request: Request<pb::ValidateResourceConfigRequest>,
    ) -> Result<Response<pb::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let config = decode(&req.config, "config")?;

        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, config)
            .await
        {
            Ok(diagnostics) => diagnostics,
            Err(e) => {
                error!(error = %e, "ValidateResourceConfig failed");
                e.into_diagnostics()
            },
        };
        log_diagnostics("ValidateResourceConfig", &diagnostics);
        Ok(Response::new(pb::ValidateResourceConfigResponse {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type = tracing::field::Empty))]
    async fn upgrade_resource_state(
        &self,
        request: Request<pb::UpgradeResourceStateRequest>,
    ) -> Result<Response<pb::UpgradeResourceStateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let state = decode(&req.raw_state, "raw_state")?;

        match self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, state)
            .await
        {
            Ok(upgraded) => {
                debug!(from_version = req.version, "UpgradeResourceState completed");
                Ok(Response::new(pb::UpgradeResourceStateResponse {
                    upgraded_state: encode(&upgraded)?,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                Ok(Response::new(pb::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type = tracing::field::Empty))]
    async fn plan(
        &self,
        request: Request<pb::PlanRequest>,
    ) -> Result<Response<pb::PlanResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let prior_state = if req.prior_state.is_empty() {
            None
        } else {
            Some(decode(&req.prior_state, "prior_state")?)
        };
        let proposed_state = decode(&req.proposed_state, "proposed_state")?;
        let config = decode(&req.config, "config")?;
        debug!(is_create = prior_state.is_none(), "Plan called");

        match self
            .provider
            .plan(&req.resource_type, prior_state, proposed_state, config)
            .await
        {
            Ok(result) => {
                info!(
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(Response::new(pb::PlanResponse {
                    planned_state: encode(&result.planned_state)?,
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(error = %e, "Plan failed");
                Ok(Response::new(pb::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type = tracing::field::Empty))]
    async fn create(
        &self,
        request: Request<pb::CreateRequest>,
    ) -> Result<Response<pb::CreateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let planned_state = decode(&req.planned_state, "planned_state")?;

        match self.provider.create(&req.resource_type, planned_state).await {
            Ok(state) => {
                info!("Create completed");
                Ok(Response::new(pb::CreateResponse {
                    state: encode(&state)?,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(error = %e, "Create failed");
                Ok(Response::new(pb::CreateResponse {
                    state: vec![],
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type = tracing::field::Empty))]
    async fn read(&self, request: Request<pb::ReadRequest>) -> Result<Response<pb::ReadResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let current_state = decode(&req.current_state, "current_state")?;

        match self.provider.read(&req.resource_type, current_state).await {
            Ok(Some(state)) => {
                debug!("Read completed");
                Ok(Response::new(pb::ReadResponse {
                    state: encode(&state)?,
                    diagnostics: vec![],
                }))
            },
            Ok(None) => {
                info!("Read found no remote object");
                Ok(Response::new(pb::ReadResponse {
                    state: vec![],
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(error = %e, "Read failed");
                Ok(Response::new(pb::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type = tracing::field::Empty))]
    async fn update(
        &self,
        request: Request<pb::UpdateRequest>,
    ) -> Result<Response<pb::UpdateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let prior_state = decode(&req.prior_state, "prior_state")?;
        let planned_state = decode(&req.planned_state, "planned_state")?;

        match self
            .provider
            .update(&req.resource_type, prior_state, planned_state)
            .await
        {
            Ok(state) => {
                info!("Update completed");
                Ok(Response::new(pb::UpdateResponse {
                    state: encode(&state)?,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(error = %e, "Update failed");
                Ok(Response::new(pb::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type = tracing::field::Empty))]
    async fn delete(
        &self,
        request: Request<pb::DeleteRequest>,
    ) -> Result<Response<pb::DeleteResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let current_state = decode(&req.current_state, "current_state")?;

        let diagnostics = match self.provider.delete(&req.resource_type, current_state).await {
            Ok(()) => {
                info!("Delete completed");
                vec![]
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_to_proto(e)
            },
        };
        Ok(Response::new(pb::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type = tracing::field::Empty))]
    async fn import_resource_state(
        &self,
        request: Request<pb::ImportResourceStateRequest>,
    ) -> Result<Response<pb::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(id = %req.id, imported = imported.len(), "ImportResourceState completed");
                let imported: Vec<pb::ImportedResource> = imported
                    .into_iter()
                    .map(|r| -> Result<pb::ImportedResource, Status> {
                        Ok(pb::ImportedResource {
                            resource_type: r.resource_type,
                            state: encode(&r.state)?,
                        })
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Response::new(pb::ImportResourceStateResponse {
                    imported,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(id = %req.id, error = %e, "ImportResourceState failed");
                Ok(Response::new(pb::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_proto(e),
                }))
            },
        }
    }
}

/// Options for serving the plugin.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
    /// Address to bind. Default: an ephemeral port on 127.0.0.1.
    pub listen_addr: Option<SocketAddr>,
    /// Registry address announced in the handshake.
    pub provider_address: String,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            listen_addr: None,
            provider_address: PROVIDER_ADDRESS.to_string(),
        }
    }
}

impl ServeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the listen address taken from `TFEPATCH_LISTEN_ADDR` if set.
    pub fn from_env() -> Result<Self, ProviderError> {
        let mut options = Self::default();
        if let Ok(raw) = std::env::var(LISTEN_ADDR_ENV) {
            let addr = raw.trim().parse::<SocketAddr>().map_err(|e| {
                ProviderError::Configuration(format!("{} {:?} is invalid: {}", LISTEN_ADDR_ENV, raw, e))
            })?;
            options.listen_addr = Some(addr);
        }
        Ok(options)
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    pub fn with_provider_address(mut self, address: impl Into<String>) -> Self {
        self.provider_address = address.into();
        self
    }
}

/// The line printed on stdout once the server is listening.
///
/// Format: `TFEPATCH_PLUGIN|<protocol version>|<provider address>|<listen address>`
pub fn handshake_line(provider_address: &str, addr: SocketAddr) -> String {
    format!(
        "{}|{}|{}|{}",
        HANDSHAKE_PREFIX, PROTOCOL_VERSION, provider_address, addr
    )
}

/// Resolves on SIGTERM or SIGINT (CTRL+C elsewhere).
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received CTRL+C, shutting down");
    }

    Ok(())
}

/// Like [`wait_for_shutdown_signal`], but never resolves if handlers cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Failed to install signal handlers, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}

/// Serve a provider with default options.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), ProviderError> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Bind the configured address, print the handshake and serve until shutdown.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let bind_addr = options
        .listen_addr
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
    let listener = TcpListener::bind(bind_addr).await?;

    serve_on_listener(provider, listener, options).await
}

/// Serve on an already-bound listener.
pub async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    use std::io::Write;

    let addr = listener.local_addr()?;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", handshake_line(&options.provider_address, addr))?;
        stdout.flush()?;
    }
    info!(address = %addr, provider = %options.provider_address, "Provider server starting");

    let provider = Arc::new(provider);
    let service = ProviderGrpcService::new(Arc::clone(&provider)).into_server();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        async move {
            let _ = shutdown_rx.await;
        },
    );
    tokio::pin!(server);

    let signalled = tokio::select! {
        result = &mut server => {
            result?;
            false
        }
        _ = shutdown_signal() => true,
    };

    if signalled {
        let _ = shutdown_tx.send(());
        match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
            Ok(Ok(())) => info!("Server drained"),
            Ok(Err(e)) => {
                error!(error = %e, "Server error during shutdown");
                return Err(e.into());
            },
            Err(_) => warn!(
                timeout = ?options.shutdown_timeout,
                "Shutdown timeout exceeded, dropping in-flight requests"
            ),
        }
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}
