use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::collection::CollectionDef;
use crate::error::{ValidationError, ValidationErrors};
use crate::types::Fields;

use super::node::{is_timestamp_field, SchemaNode};

// ============================================================================
// ISO 8601 Date Regex
// ============================================================================

/// Compiled once at first use.
fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})?$")
            .expect("ISO date regex is valid")
    })
}

/// Validate ISO 8601 format plus calendar correctness via chrono.
pub(crate) fn is_valid_iso_date(s: &str) -> bool {
    if !iso_date_regex().is_match(s) {
        return false;
    }
    // chrono wants an explicit offset; a bare local time is read as UTC.
    let has_offset = s.ends_with('Z') || s[10..].contains('+') || s[10..].contains('-');
    let normalised = if has_offset {
        s.to_string()
    } else {
        format!("{s}Z")
    };
    chrono::DateTime::parse_from_rfc3339(&normalised).is_ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Core check
// ============================================================================

fn check(schema: &SchemaNode, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    let ok = match schema {
        SchemaNode::String | SchemaNode::RichText => value.is_string(),
        SchemaNode::Boolean => value.is_boolean(),
        SchemaNode::Date | SchemaNode::CreatedAt | SchemaNode::UpdatedAt => {
            value.as_str().is_some_and(is_valid_iso_date)
        }
        SchemaNode::Optional(inner) => {
            if value.is_null() {
                true
            } else {
                return check(inner, value, path, errors);
            }
        }
    };
    if !ok {
        let received = match value {
            Value::String(s) if *schema == SchemaNode::Date || is_timestamp_field(schema) => {
                format!("{s:?}")
            }
            other => type_name(other).to_string(),
        };
        errors.push(ValidationError {
            path: path.to_string(),
            expected: schema.expected(),
            received,
        });
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate a single value against `schema`. `path` names the value in
/// error messages.
pub fn validate(schema: &SchemaNode, value: &Value, path: &str) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    check(schema, value, path, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// How much of the schema a payload must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCoverage {
    /// Every required (non-optional) declared field must be present.
    /// Used for `create` payloads.
    Full,
    /// Only the fields present are checked. Used for `update` payloads.
    Partial,
}

/// Validate a field payload against the collection's declared schema.
///
/// Rejects undeclared fields and any attempt to write `id`, which is owned by
/// the store.
pub fn validate_fields(
    def: &CollectionDef,
    fields: &Fields,
    coverage: FieldCoverage,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    for (name, value) in fields {
        if name == "id" {
            errors.push(ValidationError {
                path: "id".to_string(),
                expected: "store-assigned id (not writable)".to_string(),
                received: type_name(value).to_string(),
            });
            continue;
        }
        match def.field(name) {
            Some(node) => check(node, value, name, &mut errors),
            None => errors.push(ValidationError {
                path: name.clone(),
                expected: format!("a field declared on \"{}\"", def.name),
                received: "undeclared field".to_string(),
            }),
        }
    }

    if coverage == FieldCoverage::Full {
        for (name, node) in def.user_fields() {
            if matches!(node, SchemaNode::Optional(_)) || fields.contains_key(name) {
                continue;
            }
            errors.push(ValidationError {
                path: name.clone(),
                expected: node.expected(),
                received: "missing".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
