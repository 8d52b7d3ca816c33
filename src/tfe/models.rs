//! JSON:API request and response documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// JSON:API type of GPG key objects.
pub const GPG_KEYS_TYPE: &str = "gpg-keys";

/// JSON:API type of registry provider objects.
pub const REGISTRY_PROVIDERS_TYPE: &str = "registry-providers";

/// A single-object document: `{"data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    pub data: T,
}

/// A collection document: `{"data": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDocument<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A resource object with its type tag and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject<A> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
}

impl<A> ResourceObject<A> {
    fn new(kind: &str, attributes: A) -> Self {
        Self {
            id: None,
            kind: kind.to_string(),
            attributes,
        }
    }
}

/// Attributes sent when creating a GPG key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewGpgKeyAttributes {
    pub namespace: String,
    pub ascii_armor: String,
}

/// Attributes of a GPG key as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GpgKeyAttributes {
    pub namespace: String,
    pub ascii_armor: String,
    pub key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

pub type GpgKeyRequest = Document<ResourceObject<NewGpgKeyAttributes>>;
pub type GpgKeyDocument = Document<ResourceObject<GpgKeyAttributes>>;
pub type GpgKeyList = ListDocument<ResourceObject<GpgKeyAttributes>>;

impl GpgKeyRequest {
    /// Build a create request for an ASCII-armored public key.
    pub fn new(namespace: impl Into<String>, ascii_armor: impl Into<String>) -> Self {
        Document {
            data: ResourceObject::new(
                GPG_KEYS_TYPE,
                NewGpgKeyAttributes {
                    namespace: namespace.into(),
                    ascii_armor: ascii_armor.into(),
                },
            ),
        }
    }
}

impl GpgKeyDocument {
    /// Wrap server-side key attributes in a response document.
    pub fn from_attributes(attributes: GpgKeyAttributes) -> Self {
        Document {
            data: ResourceObject {
                id: Some(attributes.key_id.clone()),
                kind: GPG_KEYS_TYPE.to_string(),
                attributes,
            },
        }
    }
}

/// Which registry a provider is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryName {
    Public,
    Private,
}

impl RegistryName {
    /// All accepted values, in schema order.
    pub const VALUES: [&'static str; 2] = ["public", "private"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for RegistryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a registry name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("registry name must be one of public, private; got \"{0}\"")]
pub struct InvalidRegistryName(pub String);

impl FromStr for RegistryName {
    type Err = InvalidRegistryName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(InvalidRegistryName(other.to_string())),
        }
    }
}

/// Attributes of a registry provider, used for both requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryProviderAttributes {
    pub name: String,
    pub namespace: String,
    pub registry_name: RegistryName,
}

pub type RegistryProviderRequest = Document<ResourceObject<RegistryProviderAttributes>>;
pub type RegistryProviderDocument = Document<ResourceObject<RegistryProviderAttributes>>;

impl RegistryProviderRequest {
    /// Build a create request.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        registry_name: RegistryName,
    ) -> Self {
        Document {
            data: ResourceObject::new(
                REGISTRY_PROVIDERS_TYPE,
                RegistryProviderAttributes {
                    name: name.into(),
                    namespace: namespace.into(),
                    registry_name,
                },
            ),
        }
    }
}

/// JSON:API error document returned on failures.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDocument {
    #[serde(default)]
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorObject {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorDocument {
    /// Flatten the error objects into one message.
    pub(crate) fn message(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.detail.as_deref().or(e.title.as_deref()))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
