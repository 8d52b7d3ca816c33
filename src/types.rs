//! Plan, import and metadata values exchanged between [`crate::TfeProvider`]
//! and the gRPC adapter, plus the protocol constants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generated as pb;

/// One attribute's transition in a plan. `before` is `None` on create and
/// `after` is `None` on destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(default)]
    pub requires_replace: bool,
}

impl AttributeChange {
    fn between(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
            requires_replace: false,
        }
    }

    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::between(path, None, Some(value))
    }

    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::between(path, Some(value), None)
    }

    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::between(path, Some(before), Some(after))
    }

    pub fn forcing_replace(self) -> Self {
        Self {
            requires_replace: true,
            ..self
        }
    }
}

/// Absent sides travel as empty bytes.
fn side_to_bytes(value: Option<&Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(v).ok())
        .unwrap_or_default()
}

fn side_from_bytes(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

impl From<pb::AttributeChange> for AttributeChange {
    fn from(proto: pb::AttributeChange) -> Self {
        Self {
            before: side_from_bytes(&proto.before),
            after: side_from_bytes(&proto.after),
            path: proto.path,
            requires_replace: proto.requires_replace,
        }
    }
}

impl From<AttributeChange> for pb::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            before: side_to_bytes(change.before.as_ref()),
            after: side_to_bytes(change.after.as_ref()),
            path: change.path,
            requires_replace: change.requires_replace,
        }
    }
}

/// Outcome of planning one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// `Null` when the resource is being destroyed.
    pub planned_state: Value,
    pub changes: Vec<AttributeChange>,
    pub requires_replace: bool,
}

impl PlanResult {
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Replacement is required as soon as any change requires it.
    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>) -> Self {
        Self {
            requires_replace: changes.iter().any(|c| c.requires_replace),
            planned_state,
            changes,
        }
    }
}

/// State produced by an import id, before the follow-up read fills it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub resource_type: String,
    pub state: Value,
}

impl ImportedResource {
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Prefix of every resource type name.
    pub type_name: String,
    pub resources: Vec<String>,
}

pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line printed on stdout.
pub const HANDSHAKE_PREFIX: &str = "TFEPATCH_PLUGIN";

/// Resource types are named `<type name>_<suffix>`.
pub const PROVIDER_TYPE_NAME: &str = "tfepatch";

/// Registry address the plugin is served under (host/namespace/name).
pub const PROVIDER_ADDRESS: &str = "tsanton/gruntwork-corp/tfepatch";

/// Placeholder the host sends for values not known until apply. Computed
/// attributes are planned with it too.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

pub fn is_unknown(value: &Value) -> bool {
    value.as_str() == Some(UNKNOWN_VALUE)
}

pub fn unknown() -> Value {
    Value::String(UNKNOWN_VALUE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("namespace", json!("acme"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("acme")));
        assert!(!added.requires_replace);

        let removed = AttributeChange::removed("namespace", json!("acme"));
        assert_eq!(removed.before, Some(json!("acme")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("name", json!("aws"), json!("gcp")).forcing_replace();
        assert!(modified.requires_replace);
    }

    #[test]
    fn test_attribute_change_conversion() {
        let change =
            AttributeChange::modified("registry_name", json!("public"), json!("private"))
                .forcing_replace();

        let proto: crate::generated::AttributeChange = change.clone().into();
        assert_eq!(proto.path, "registry_name");
        assert!(proto.requires_replace);

        let back: AttributeChange = proto.into();
        assert_eq!(back, change);
    }

    #[test]
    fn test_plan_result_replace_follows_changes() {
        let plan = PlanResult::with_changes(
            json!({"name": "gcp"}),
            vec![AttributeChange::modified("name", json!("aws"), json!("gcp")).forcing_replace()],
        );
        assert!(plan.requires_replace);

        let plan = PlanResult::no_change(json!({"name": "aws"}));
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_unknown_value() {
        assert!(is_unknown(&unknown()));
        assert!(!is_unknown(&json!("acme")));
        assert!(!is_unknown(&json!(null)));
    }
}
