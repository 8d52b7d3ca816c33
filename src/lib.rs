//! tfepatch: a provider plugin for Terraform Enterprise resources the official
//! provider does not manage yet.
//!
//! Two resource types are served:
//!
//! - `tfepatch_gpg_key`: a GPG public key in the private registry, id
//!   `namespace||key_id`
//! - `tfepatch_registry_provider`: a provider in an organization's public or
//!   private registry, id `namespace||name||registry_name`
//!
//! Ids are lowercased when generated. Every input attribute forces
//! replacement, so updates never reach the API.
//!
//! # Layout
//!
//! - [`tfe`]: a minimal TFE API client behind the [`tfe::GpgService`] and
//!   [`tfe::RegistryProviderService`] traits
//! - [`resource`] and [`resources`]: the resource trait, its registry and the
//!   two implementations
//! - [`provider`]: configuration and dispatch ([`TfeProvider`])
//! - [`server`]: the gRPC adapter, handshake and graceful shutdown
//! - [`testing`]: [`testing::ProviderTester`] and the in-memory
//!   [`testing::FakeTfe`]
//!
//! # Handshake Protocol
//!
//! Once listening, the plugin prints one line to stdout:
//!
//! ```text
//! TFEPATCH_PLUGIN|1|tsanton/gruntwork-corp/tfepatch|127.0.0.1:50051
//! ```
//!
//! Format: `TFEPATCH_PLUGIN|<protocol_version>|<provider address>|<listen address>`.
//! Logs are written to stderr.

#![warn(clippy::all)]

pub mod composite_id;
pub mod diagnostic;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod tfe;
pub mod types;
pub mod validation;

/// Plugin protocol types generated from `proto/provider.proto`.
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use diagnostic::{Diagnostic, DiagnosticResult, DiagnosticSeverity, Diagnostics};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{ClientFactory, ProviderConfig, TfeProvider};
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on_listener, serve_with_options, ProviderGrpcService, ProviderService,
    ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION, PROVIDER_ADDRESS,
};
pub use validation::{is_valid, validate, validate_result};
