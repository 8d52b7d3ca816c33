//! Error types for the tfepatch provider.

use thiserror::Error;

use crate::composite_id::CompositeIdError;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::resource::Capability;
use crate::tfe::TfeError;

/// Errors returned by provider and resource operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Validation produced field-scoped diagnostics.
    #[error("{0}")]
    Diagnostics(Diagnostics),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A resource was registered without a capability every resource must provide.
    #[error("Resource {resource_type} does not provide the {capability:?} capability")]
    MissingCapability {
        /// Full resource type name.
        resource_type: String,
        /// The capability that is missing.
        capability: Capability,
    },

    /// The import id could not be parsed.
    #[error("Invalid import id: {0}")]
    ImportId(#[from] CompositeIdError),

    /// A call to the TFE API failed.
    #[error("Error {operation} resource: {source}")]
    Remote {
        /// What the provider was doing, e.g. `creating`.
        operation: &'static str,
        /// The underlying client error.
        #[source]
        source: TfeError,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// An I/O error occurred while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Wrap a client error with the operation that triggered it.
    pub fn remote(operation: &'static str, source: TfeError) -> Self {
        Self::Remote { operation, source }
    }

    /// Convert the error into the diagnostics reported to the host.
    ///
    /// Remote failures keep a generic summary and carry the client error as
    /// detail. Field-scoped diagnostics pass through untouched.
    pub fn into_diagnostics(self) -> Diagnostics {
        match self {
            Self::Diagnostics(diagnostics) => diagnostics,
            Self::Remote { operation, source } => Diagnostics::from(
                Diagnostic::error(format!("Error {} resource", operation))
                    .with_detail(format!("Could not {} resource: {}", verb(operation), source)),
            ),
            other => Diagnostics::from(Diagnostic::error(other.to_string())),
        }
    }
}

fn verb(operation: &str) -> &str {
    match operation {
        "creating" => "create",
        "reading" => "read",
        "deleting" => "delete",
        other => other,
    }
}

impl From<Diagnostics> for ProviderError {
    fn from(diagnostics: Diagnostics) -> Self {
        Self::Diagnostics(diagnostics)
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Diagnostics(diags) => tonic::Status::invalid_argument(diags.to_string()),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::ImportId(err) => tonic::Status::invalid_argument(err.to_string()),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            other @ (ProviderError::MissingCapability { .. }
            | ProviderError::Remote { .. }
            | ProviderError::Transport(_)
            | ProviderError::Io(_)) => tonic::Status::internal(other.to_string()),
        }
    }
}
