//! Schema-driven planning.
//!
//! Compares prior state with the proposed configuration. A change to any
//! force-new attribute requires replacement; computed attributes are planned
//! as unknown whenever the provider will assign them again.

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{unknown, AttributeChange, PlanResult};

/// Plan a resource change.
///
/// - `prior = None` plans a create.
/// - `proposed = Null` plans a destroy.
/// - Otherwise configured attributes are diffed against the prior state.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    match (prior, proposed) {
        (Some(prior), Value::Null) => plan_destroy(schema, prior),
        (None, proposed) => plan_create(schema, proposed),
        (Some(prior), proposed) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: &Value) -> PlanResult {
    let mut planned = as_object(proposed);
    let mut changes = Vec::new();

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() && is_absent(planned.get(name)) {
            planned.insert(name.clone(), unknown());
        }
        if let Some(value) = planned.get(name).filter(|v| !v.is_null()) {
            changes.push(AttributeChange::added(name.clone(), value.clone()));
        }
    }

    PlanResult::with_changes(Value::Object(planned), changes)
}

fn plan_update(schema: &Schema, prior: &Value, proposed: &Value) -> PlanResult {
    let mut changes = Vec::new();

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let before = prior.get(name).cloned().unwrap_or(Value::Null);
        let after = proposed.get(name).cloned().unwrap_or(Value::Null);
        if before != after {
            let change = AttributeChange::modified(name.clone(), before, after);
            changes.push(if attr.force_new {
                change.forcing_replace()
            } else {
                change
            });
        }
    }

    if changes.is_empty() {
        return PlanResult::no_change(prior.clone());
    }

    let replace = changes.iter().any(|c| c.requires_replace);
    let mut planned = as_object(proposed);
    for (name, attr) in &schema.attributes {
        if !attr.flags.is_computed_only() {
            continue;
        }
        let value = if replace {
            unknown()
        } else {
            prior.get(name).cloned().unwrap_or(Value::Null)
        };
        planned.insert(name.clone(), value);
    }

    PlanResult::with_changes(Value::Object(planned), changes)
}

fn plan_destroy(schema: &Schema, prior: &Value) -> PlanResult {
    let changes = schema
        .attributes
        .keys()
        .filter_map(|name| {
            prior
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| AttributeChange::removed(name.clone(), v.clone()))
        })
        .collect();

    PlanResult::with_changes(Value::Null, changes)
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn is_absent(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use crate::types::UNKNOWN_VALUE;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("key_id", Attribute::computed_string())
            .with_attribute("namespace", Attribute::required_string().with_force_new())
            .with_attribute("public_key", Attribute::required_string().with_force_new())
    }

    #[test]
    fn test_plan_create_marks_computed_unknown() {
        let plan = plan_resource(&schema(), None, &json!({"namespace": "acme", "public_key": "K"}));

        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["id"], UNKNOWN_VALUE);
        assert_eq!(plan.planned_state["key_id"], UNKNOWN_VALUE);
        assert_eq!(plan.planned_state["namespace"], "acme");
        assert_eq!(plan.changes.len(), 4);
    }

    #[test]
    fn test_plan_no_change_keeps_prior() {
        let prior = json!({"id": "acme||abc", "key_id": "ABC", "namespace": "acme", "public_key": "K"});
        let proposed = json!({"id": null, "key_id": null, "namespace": "acme", "public_key": "K"});

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert!(plan.changes.is_empty());
        assert_eq!(plan.planned_state, prior);
    }

    #[test]
    fn test_plan_force_new_change_requires_replace() {
        let prior = json!({"id": "acme||abc", "key_id": "ABC", "namespace": "acme", "public_key": "K"});
        let proposed = json!({"namespace": "other", "public_key": "K"});

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert!(plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "namespace");
        assert_eq!(plan.planned_state["key_id"], UNKNOWN_VALUE);
    }

    #[test]
    fn test_plan_in_place_change_carries_computed() {
        let schema = Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("description", Attribute::required_string());
        let prior = json!({"id": "x", "description": "old"});

        let plan = plan_resource(&schema, Some(&prior), &json!({"description": "new"}));
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["id"], "x");
    }

    #[test]
    fn test_plan_destroy() {
        let prior = json!({"id": "acme||abc", "key_id": "ABC", "namespace": "acme", "public_key": "K"});
        let plan = plan_resource(&schema(), Some(&prior), &Value::Null);

        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 4);
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }
}
