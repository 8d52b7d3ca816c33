//! Resource types served by the provider.

mod gpg_key;
mod registry_provider;

pub use gpg_key::{GpgKeyModel, GpgKeyResource};
pub use registry_provider::{RegistryProviderModel, RegistryProviderResource};
