//! Declarative attribute schemas.
//!
//! A [`Schema`] lists the attributes of a resource or of the provider block.
//! The same value drives validation, planning and the GetSchema response, so
//! a constraint declared here is enforced everywhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value types an attribute can hold. Both resources only need these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Bool,
}

/// Who sets an attribute, and whether it may be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    pub required: bool,
    pub optional: bool,
    /// Set by the provider, never by configuration.
    pub computed: bool,
    /// Redacted from logs and plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Self::default()
        }
    }

    /// True when configuration can never supply the value.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !(self.optional || self.required)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(flatten)]
    pub flags: AttributeFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this attribute replaces the remote object.
    #[serde(default)]
    pub force_new: bool,
    /// Permitted string values. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl Attribute {
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            allowed_values: Vec::new(),
        }
    }

    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn with_force_new(self) -> Self {
        Self {
            force_new: true,
            ..self
        }
    }

    /// Restrict a string attribute to a closed set, e.g. `["public", "private"]`.
    pub fn one_of<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_values: values.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Attributes of one resource type or of the provider block, keyed by name.
///
/// `version` is reported to the host and passed back on state upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schema {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            attributes: BTreeMap::new(),
            description: None,
        }
    }

    pub fn v0() -> Self {
        Self::new(0)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Everything GetSchema returns: the provider block plus one schema per
/// resource type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    #[serde(default)]
    pub provider: Schema,
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_config(self, provider: Schema) -> Self {
        Self { provider, ..self }
    }

    pub fn with_resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(type_name.into(), schema);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.is_computed_only());

        let computed = AttributeFlags::computed();
        assert!(computed.is_computed_only());

        let optional = AttributeFlags::optional();
        assert!(optional.optional);
        assert!(!optional.is_computed_only());
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("The registry type")
            .with_force_new()
            .one_of(["public", "private"]);

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert_eq!(attr.allowed_values, vec!["public", "private"]);

        let token = Attribute::required_string().sensitive();
        assert!(token.flags.sensitive);
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("token", Attribute::required_string().sensitive()),
            )
            .with_resource(
                "tfepatch_gpg_key",
                Schema::v0()
                    .with_attribute("namespace", Attribute::required_string())
                    .with_attribute("id", Attribute::computed_string()),
            );

        assert!(provider_schema.provider.attribute("token").is_some());
        let gpg = &provider_schema.resources["tfepatch_gpg_key"];
        assert!(gpg.attribute("namespace").is_some());
        assert!(gpg.attribute("missing").is_none());
    }

    #[test]
    fn test_schema_serializes_allowed_values() {
        let schema = Schema::v0().with_attribute(
            "registry_name",
            Attribute::required_string().one_of(["public", "private"]),
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json["attributes"]["registry_name"]["allowed_values"],
            serde_json::json!(["public", "private"])
        );
        assert_eq!(json["attributes"]["registry_name"]["type"], "string");
    }
}
