//! Tool synthesizer
//!
//! Turns every operation of a `SpecDocument` into a `ToolDescriptor`.
//!
//! # Naming
//!
//! The tool name is the operation's `operationId` (characters outside
//! `[A-Za-z0-9_-]` replaced by `_`), or `<method>_<path slug>` when there is
//! none: `GET /balances/evm/{address}` becomes `get_balances_evm_address`.
//! Names are capped at 64 characters. When two operations derive the same
//! name, the `CollisionPolicy` either suffixes later ones (`_2`, `_3`, ... in
//! declaration order) or rejects the document.
//!
//! # Input schema
//!
//! Each parameter becomes one property. A JSON or form request body whose
//! schema is an object with properties is flattened into top-level properties;
//! any other body becomes a single `body` property. Local `$ref`s are inlined.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::descriptor::{
    ArgumentBinding, ArgumentTarget, BodyBinding, BodyEncoding, HttpBinding, QueryStyle,
    ToolDescriptor,
};
use super::registry::ToolSnapshot;
use crate::core::{CollisionPolicy, SynthesisError};
use crate::openapi::{HttpMethod, MediaType, Operation, ParamLocation, RequestBody, SpecDocument};

/// Longest tool name handed to clients
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Name of the property carrying a non-flattened request body
const BODY_ARGUMENT: &str = "body";

/// Builds tool snapshots from OpenAPI documents
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolSynthesizer {
    collision_policy: CollisionPolicy,
}

impl ToolSynthesizer {
    pub fn new(collision_policy: CollisionPolicy) -> Self {
        Self { collision_policy }
    }

    /// Build a snapshot with one tool per operation
    ///
    /// The same document always yields the same snapshot.
    pub fn synthesize(&self, doc: &SpecDocument) -> Result<ToolSnapshot, SynthesisError> {
        let mut taken: HashMap<String, String> = HashMap::new();
        let mut tools = Vec::with_capacity(doc.operations.len());

        for op in &doc.operations {
            let name = self.assign_name(op, &taken)?;
            let tool = build_tool(doc, op, name)?;

            tracing::debug!(
                "[ToolSynthesizer] {} -> '{}'",
                op.label(),
                tool.name
            );

            taken.insert(tool.name.clone(), op.label());
            tools.push(tool);
        }

        tracing::info!(
            "[ToolSynthesizer] Synthesized {} tools from '{}' version {}",
            tools.len(),
            doc.title,
            doc.version
        );

        ToolSnapshot::new(doc.version.clone(), tools)
    }

    fn assign_name(
        &self,
        op: &Operation,
        taken: &HashMap<String, String>,
    ) -> Result<String, SynthesisError> {
        let base = base_tool_name(op);

        let Some(first) = taken.get(&base) else {
            return Ok(base);
        };

        match self.collision_policy {
            CollisionPolicy::Reject => Err(SynthesisError::NameCollision {
                name: base,
                first: first.clone(),
                second: op.label(),
            }),
            CollisionPolicy::Suffix => {
                let mut n = 2usize;
                loop {
                    let suffix = format!("_{}", n);
                    let candidate = format!(
                        "{}{}",
                        truncate(&base, MAX_TOOL_NAME_LEN - suffix.len()),
                        suffix
                    );
                    if !taken.contains_key(&candidate) {
                        tracing::warn!(
                            "[ToolSynthesizer] Name '{}' already used by {}, renaming {} to '{}'",
                            base,
                            first,
                            op.label(),
                            candidate
                        );
                        return Ok(candidate);
                    }
                    n += 1;
                }
            }
        }
    }
}

/// Derive the unsuffixed tool name of an operation
pub fn base_tool_name(op: &Operation) -> String {
    let name = match op.operation_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        _ => path_slug(op.method, &op.path),
    };
    truncate(&name, MAX_TOOL_NAME_LEN).to_string()
}

/// `GET /balances/evm/{address}` -> `get_balances_evm_address`
fn path_slug(method: HttpMethod, path: &str) -> String {
    let mut slug = method.as_str().to_lowercase();
    let mut separate = true;

    for c in path.chars() {
        if c == '{' || c == '}' {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if separate {
                slug.push('_');
                separate = false;
            }
            slug.push(c.to_ascii_lowercase());
        } else {
            separate = true;
        }
    }

    slug
}

// Names are ASCII by construction
fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        name
    } else {
        &name[..max]
    }
}

fn describe(op: &Operation) -> String {
    let summary = op.summary.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let details = op
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let text = match (summary, details) {
        (Some(s), Some(d)) if s != d => format!("{}\n\n{}", s, d),
        (Some(s), _) => s.to_string(),
        (None, Some(d)) => d.to_string(),
        (None, None) => op.label(),
    };

    if op.deprecated {
        format!("[Deprecated] {}", text)
    } else {
        text
    }
}

fn build_tool(
    doc: &SpecDocument,
    op: &Operation,
    name: String,
) -> Result<ToolDescriptor, SynthesisError> {
    let label = op.label();
    let resolver = SchemaResolver {
        doc,
        operation: &label,
    };

    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();
    let mut arguments = Vec::new();

    for param in &op.parameters {
        let mut argument = param.name.clone();
        if properties.contains_key(&argument) {
            argument = format!("{}_{}", param.location.as_str(), param.name);
            if properties.contains_key(&argument) {
                return Err(SynthesisError::unsupported(
                    &label,
                    format!("duplicate parameter '{}'", param.name),
                ));
            }
        }

        let mut schema = resolver.inline(&param.schema)?;
        if let (Some(description), Value::Object(obj)) = (&param.description, &mut schema) {
            obj.entry("description")
                .or_insert_with(|| json!(description));
        }

        properties.insert(argument.clone(), schema);
        if param.required {
            required.push(argument.clone());
        }

        let name = param.name.clone();
        let target = match param.location {
            ParamLocation::Path => ArgumentTarget::Path { name },
            ParamLocation::Query => {
                let style = QueryStyle::from_openapi(param.style.as_deref());
                ArgumentTarget::Query {
                    name,
                    style,
                    // OpenAPI default: explode only for the form style
                    explode: param.explode.unwrap_or(style == QueryStyle::Form),
                }
            }
            ParamLocation::Header => ArgumentTarget::Header { name },
            ParamLocation::Cookie => ArgumentTarget::Cookie { name },
        };
        arguments.push(ArgumentBinding { argument, target });
    }

    let body = match &op.request_body {
        Some(request_body) => Some(bind_body(
            &resolver,
            request_body,
            &mut properties,
            &mut required,
            &mut arguments,
        )?),
        None => None,
    };

    let mut input_schema = Map::new();
    input_schema.insert("type".into(), json!("object"));
    input_schema.insert("properties".into(), Value::Object(properties));
    input_schema.insert("required".into(), json!(required));

    Ok(ToolDescriptor {
        name,
        description: describe(op),
        input_schema,
        output_schema: output_schema(&resolver, op),
        binding: HttpBinding {
            method: op.method,
            path_template: op.path.clone(),
            arguments,
            body,
        },
    })
}

fn bind_body(
    resolver: &SchemaResolver<'_>,
    request_body: &RequestBody,
    properties: &mut Map<String, Value>,
    required: &mut Vec<String>,
    arguments: &mut Vec<ArgumentBinding>,
) -> Result<BodyBinding, SynthesisError> {
    let (media, encoding) = choose_media_type(&request_body.content).ok_or_else(|| {
        let offered: Vec<_> = request_body
            .content
            .iter()
            .map(|m| m.content_type.as_str())
            .collect();
        SynthesisError::unsupported(
            resolver.operation,
            format!(
                "no supported request body media type (offered: [{}])",
                offered.join(", ")
            ),
        )
    })?;

    let mut schema = resolver.inline(&media.schema)?;

    let flattened = match (&encoding, flattenable_properties(&schema)) {
        (BodyEncoding::Json | BodyEncoding::Form, Some(body_props))
            if body_props.keys().all(|k| !properties.contains_key(k)) =>
        {
            Some(body_props.clone())
        }
        _ => None,
    };

    if let Some(body_props) = flattened {
        let body_required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for (field, field_schema) in body_props {
            if request_body.required && body_required.contains(&field.as_str()) {
                required.push(field.clone());
            }
            arguments.push(ArgumentBinding {
                argument: field.clone(),
                target: ArgumentTarget::BodyField {
                    name: field.clone(),
                },
            });
            properties.insert(field, field_schema);
        }
    } else {
        if properties.contains_key(BODY_ARGUMENT) {
            return Err(SynthesisError::unsupported(
                resolver.operation,
                "a parameter named 'body' collides with the request body",
            ));
        }

        if let (Some(description), Value::Object(obj)) = (&request_body.description, &mut schema)
        {
            obj.entry("description")
                .or_insert_with(|| json!(description));
        }

        properties.insert(BODY_ARGUMENT.to_string(), schema);
        if request_body.required {
            required.push(BODY_ARGUMENT.to_string());
        }
        arguments.push(ArgumentBinding {
            argument: BODY_ARGUMENT.to_string(),
            target: ArgumentTarget::Body,
        });
    }

    Ok(BodyBinding {
        content_type: media.content_type.clone(),
        encoding,
        required: request_body.required,
    })
}

/// Properties of an object schema, if it can be flattened
fn flattenable_properties(schema: &Value) -> Option<&Map<String, Value>> {
    let is_object = match schema.get("type") {
        Some(Value::String(t)) => t == "object",
        None => true,
        _ => false,
    };
    if !is_object {
        return None;
    }
    schema
        .get("properties")
        .and_then(Value::as_object)
        .filter(|props| !props.is_empty())
}

fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the request body media type, in order of preference
fn choose_media_type(content: &[MediaType]) -> Option<(&MediaType, BodyEncoding)> {
    let find = |pred: &dyn Fn(&str) -> bool| {
        content
            .iter()
            .find(|m| pred(&media_essence(&m.content_type)))
    };

    find(&|ct: &str| ct == "application/json")
        .map(|m| (m, BodyEncoding::Json))
        .or_else(|| find(&|ct: &str| ct.ends_with("+json")).map(|m| (m, BodyEncoding::Json)))
        .or_else(|| {
            find(&|ct: &str| ct == "application/x-www-form-urlencoded").map(|m| (m, BodyEncoding::Form))
        })
        .or_else(|| find(&|ct: &str| ct == "text/plain").map(|m| (m, BodyEncoding::Text)))
}

/// Only object-typed response schemas are advertised
fn output_schema(resolver: &SchemaResolver<'_>, op: &Operation) -> Option<Map<String, Value>> {
    let schema = op.response_schema.as_ref()?;
    match resolver.inline(schema) {
        Ok(Value::Object(obj)) if obj.get("type") == Some(&json!("object")) => Some(obj),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("[ToolSynthesizer] Dropping output schema: {}", e);
            None
        }
    }
}

/// Inlines local `$ref`s of one operation's schemas
struct SchemaResolver<'a> {
    doc: &'a SpecDocument,
    operation: &'a str,
}

impl SchemaResolver<'_> {
    fn inline(&self, schema: &Value) -> Result<Value, SynthesisError> {
        self.inline_with(schema, &mut Vec::new())
    }

    fn inline_with(&self, schema: &Value, stack: &mut Vec<String>) -> Result<Value, SynthesisError> {
        match schema {
            Value::Object(obj) => {
                if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                    return self.inline_ref(reference, stack);
                }
                let mut out = Map::with_capacity(obj.len());
                for (key, value) in obj {
                    out.insert(key.clone(), self.inline_with(value, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.inline_with(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn inline_ref(&self, reference: &str, stack: &mut Vec<String>) -> Result<Value, SynthesisError> {
        if stack.iter().any(|r| r == reference) {
            return Err(SynthesisError::unsupported(
                self.operation,
                format!("recursive schema reference '{}'", reference),
            ));
        }

        let target = self.doc.resolve_ref(reference).ok_or_else(|| {
            SynthesisError::unsupported(
                self.operation,
                format!("unresolvable schema reference '{}'", reference),
            )
        })?;

        stack.push(reference.to_string());
        let resolved = self.inline_with(target, stack)?;
        stack.pop();

        Ok(resolved)
    }
}
