//! Argument validation against a tool's input schema
//!
//! Only the top level is checked: required fields, undeclared fields and the
//! JSON type of each value. Nested structure is left to the remote API.

use serde_json::{Map, Value};

use super::descriptor::ToolDescriptor;
use crate::core::ArgumentProblem;

/// JSON type name of a value, using `integer` for integral numbers
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if is_integral(n) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integral(n: &serde_json::Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

/// Declared `type` of a property schema, if any
fn declared_types(schema: &Value) -> Option<Vec<&str>> {
    let mut types: Vec<&str> = match schema.get("type")? {
        Value::String(t) => vec![t.as_str()],
        Value::Array(arr) => arr.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };
    if schema.get("nullable").and_then(Value::as_bool) == Some(true) {
        types.push("null");
    }
    Some(types)
}

fn type_matches(declared: &str, value: &Value) -> bool {
    match declared {
        "integer" => matches!(value, Value::Number(n) if is_integral(n)),
        "number" => value.is_number(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown keywords are not ours to enforce
        _ => true,
    }
}

/// Check `arguments` against the tool's input schema
///
/// Returns the arguments with optional `null` values removed, or every
/// problem found, in schema order followed by undeclared fields.
pub fn validate_arguments(
    tool: &ToolDescriptor,
    arguments: Option<Value>,
) -> Result<Map<String, Value>, Vec<ArgumentProblem>> {
    let mut args = match arguments {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(vec![ArgumentProblem::NotAnObject {
                actual: json_type(&other).to_string(),
            }])
        }
    };

    let empty = Map::new();
    let properties = tool.properties().unwrap_or(&empty);
    let required = tool.required();
    let mut problems = Vec::new();
    let mut dropped = Vec::new();

    for (field, schema) in properties {
        let is_required = required.contains(&field.as_str());
        let types = declared_types(schema);
        let accepts_null = types.as_ref().is_some_and(|t| t.contains(&"null"));

        match args.get(field) {
            None => {
                if is_required {
                    problems.push(ArgumentProblem::Missing {
                        field: field.clone(),
                    });
                }
            }
            Some(Value::Null) if !is_required && !accepts_null => {
                dropped.push(field.as_str());
            }
            Some(value) => {
                if let Some(types) = types {
                    if !types.iter().any(|t| type_matches(t, value)) {
                        problems.push(ArgumentProblem::TypeMismatch {
                            field: field.clone(),
                            expected: types.join(" or "),
                            actual: json_type(value).to_string(),
                        });
                    }
                }
            }
        }
    }

    for field in dropped {
        args.remove(field);
    }

    for field in args.keys() {
        if !properties.contains_key(field) {
            problems.push(ArgumentProblem::Unexpected {
                field: field.clone(),
            });
        }
    }

    if problems.is_empty() {
        Ok(args)
    } else {
        Err(problems)
    }
}
