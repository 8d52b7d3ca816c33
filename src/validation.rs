//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports
//! field-scoped diagnostics.
//!
//! # Example
//!
//! ```
//! use tfepatch::schema::{Attribute, Schema};
//! use tfepatch::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute(
//!     "registry_name",
//!     Attribute::required_string().one_of(["public", "private"]),
//! );
//!
//! assert!(validate(&schema, &json!({"registry_name": "public"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"registry_name": "internal"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(
//!     diagnostics.as_slice()[0].attribute,
//!     Some("registry_name".to_string())
//! );
//! ```

use serde_json::Value;

use crate::diagnostic::{Diagnostic, DiagnosticResult, Diagnostics};
use crate::schema::{Attribute, AttributeType, Schema};
use crate::types::is_unknown;

/// Validate a JSON value against a schema.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Attributes with allowed values must hold one of them
/// - Unknown values pass; they are checked again once known
pub fn validate(schema: &Schema, value: &Value) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    let obj = match value {
        Value::Object(map) => map,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> DiagnosticResult<()> {
    validate(schema, value).into_result(())
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    !validate(schema, value).has_errors()
}

fn validate_attribute(
    path: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Diagnostics,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
            return;
        },
        Some(v) if is_unknown(v) => return,
        Some(v) => v,
    };

    let type_ok = match attr.attr_type {
        AttributeType::String => value.is_string(),
        AttributeType::Bool => value.is_boolean(),
    };
    if !type_ok {
        diagnostics.push(type_error(path, attr.attr_type, value));
        return;
    }

    if !attr.allowed_values.is_empty() {
        let s = value.as_str().unwrap_or_default();
        if !attr.allowed_values.iter().any(|allowed| allowed == s) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!(
                        "Value must be one of: {}, got \"{}\"",
                        attr.allowed_values.join(", "),
                        s
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: AttributeType, got: &Value) -> Diagnostic {
    let expected = match expected {
        AttributeType::String => "string",
        AttributeType::Bool => "bool",
    };
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
