//! OpenAPI document model
//!
//! Reads an OpenAPI 3.x document (JSON or YAML) with `openapiv3` and flattens
//! it into an ordered list of operations. Only the parts needed to build tools
//! are kept; schemas are handed on as JSON values and their `$ref`s are
//! inlined later by the synthesizer.

use openapiv3::{
    Components, OpenAPI, ParameterSchemaOrContent, QueryStyle, ReferenceOr, Responses, Schema,
    StatusCode,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::core::FetchError;

/// Maximum number of `$ref` hops followed for a parameter or request body
const MAX_REF_HOPS: usize = 8;

/// HTTP method of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Convert to the reqwest method type
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter travels in the HTTP request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
        }
    }
}

/// A single operation parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// JSON schema of the value (may still contain `$ref`s)
    pub schema: Value,
    pub description: Option<String>,
    /// Serialization style (`form`, `deepObject`, ...)
    pub style: Option<String>,
    pub explode: Option<bool>,
}

/// One media type offered by a request body
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub content_type: String,
    pub schema: Value,
}

/// Request body of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub required: bool,
    pub description: Option<String>,
    /// Media types in document order
    pub content: Vec<MediaType>,
}

/// One API endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: HttpMethod,
    /// Path template, e.g. `/balances/evm/{address}`
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    /// Path-level and operation-level parameters, merged
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// JSON schema of the first 2xx `application/json` response
    pub response_schema: Option<Value>,
}

impl Operation {
    /// Human-readable identity used in logs and errors, e.g. `GET /pets/{id}`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A parsed OpenAPI document
#[derive(Debug, Clone)]
pub struct SpecDocument {
    /// Value of the `openapi` field
    pub openapi: String,
    pub title: String,
    /// Declared API version (`info.version`)
    pub version: String,
    /// Operations in document order
    pub operations: Vec<Operation>,
    /// The `components` object, used to resolve `$ref`s
    pub components: Value,
}

impl SpecDocument {
    /// Parse a raw document body
    ///
    /// Bodies starting with `{` are parsed as JSON, anything else as YAML.
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let value: Value = if body.trim_start().starts_with('{') {
            serde_json::from_str(body)
                .map_err(|e| FetchError::parse(format!("body is not valid JSON: {}", e)))?
        } else {
            // Go through the YAML value first so numeric keys like `200:` become strings
            let yaml: serde_yaml::Value = serde_yaml::from_str(body)
                .map_err(|e| FetchError::parse(format!("body is not valid YAML: {}", e)))?;
            serde_json::to_value(yaml)
                .map_err(|e| FetchError::parse(format!("YAML cannot be mapped to JSON: {}", e)))?
        };

        Self::from_value(value)
    }

    /// Build a document from an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, FetchError> {
        check_header(&value)?;

        let mut spec: OpenAPI = serde_json::from_value(value)
            .map_err(|e| FetchError::parse(format!("malformed document: {}", e)))?;

        let components = spec.components.take().unwrap_or_default();

        let mut operations = Vec::new();
        for (path, item) in spec.paths.paths.iter() {
            let item = match item {
                ReferenceOr::Item(item) => item,
                ReferenceOr::Reference { .. } => {
                    return Err(FetchError::parse(format!(
                        "path item '{}' uses $ref, which is not supported",
                        path
                    )));
                }
            };

            let shared_params = parse_parameters(&components, &item.parameters, path)?;

            let methods = [
                (HttpMethod::Get, &item.get),
                (HttpMethod::Put, &item.put),
                (HttpMethod::Post, &item.post),
                (HttpMethod::Delete, &item.delete),
                (HttpMethod::Options, &item.options),
                (HttpMethod::Head, &item.head),
                (HttpMethod::Patch, &item.patch),
                (HttpMethod::Trace, &item.trace),
            ];

            for (method, op) in methods {
                let Some(op) = op else { continue };
                operations.push(build_operation(
                    &components,
                    method,
                    path,
                    op,
                    &shared_params,
                )?);
            }
        }

        let components = serde_json::to_value(&components)
            .map_err(|e| FetchError::parse(format!("components cannot be mapped to JSON: {}", e)))?;

        Ok(Self {
            openapi: spec.openapi,
            title: spec.info.title,
            version: spec.info.version,
            operations,
            components,
        })
    }

    /// Look up a local `#/components/...` reference
    pub fn resolve_ref(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix("#/components")?;
        if pointer.is_empty() {
            return None;
        }
        self.components.pointer(pointer)
    }
}

/// Reject documents that are not OpenAPI 3.x before the full parse
fn check_header(value: &Value) -> Result<(), FetchError> {
    let Some(root) = value.as_object() else {
        return Err(FetchError::parse("document root is not an object"));
    };

    let version = match root.get("openapi") {
        Some(Value::String(s)) => s,
        Some(_) => return Err(FetchError::parse("'openapi' field is not a string")),
        None => return Err(FetchError::parse("missing 'openapi' field")),
    };
    if !version.starts_with("3.") {
        return Err(FetchError::parse(format!(
            "unsupported OpenAPI version '{}' (expected 3.x)",
            version
        )));
    }

    if !root.contains_key("paths") {
        return Err(FetchError::parse("missing 'paths' object"));
    }
    Ok(())
}

/// Follow a `ReferenceOr` through `#/components/<section>/` until an item is reached
fn resolve<'a, T>(
    entry: &'a ReferenceOr<T>,
    section: &str,
    lookup: impl Fn(&str) -> Option<&'a ReferenceOr<T>>,
    context: &str,
) -> Result<&'a T, FetchError> {
    let prefix = format!("#/components/{}/", section);
    let mut current = entry;

    for _ in 0..MAX_REF_HOPS {
        match current {
            ReferenceOr::Item(item) => return Ok(item),
            ReferenceOr::Reference { reference } => {
                current = reference
                    .strip_prefix(prefix.as_str())
                    .and_then(|name| lookup(name))
                    .ok_or_else(|| {
                        FetchError::parse(format!(
                            "{}: unresolvable reference '{}'",
                            context, reference
                        ))
                    })?;
            }
        }
    }
    Err(FetchError::parse(format!("{}: reference chain too deep", context)))
}

/// Schemas are handed on as JSON; their `$ref`s are inlined by the synthesizer
fn schema_value(schema: &ReferenceOr<Schema>, context: &str) -> Result<Value, FetchError> {
    serde_json::to_value(schema)
        .map_err(|e| FetchError::parse(format!("{}: schema cannot be mapped to JSON: {}", context, e)))
}

fn query_style_name(style: &QueryStyle) -> &'static str {
    match style {
        QueryStyle::Form => "form",
        QueryStyle::SpaceDelimited => "spaceDelimited",
        QueryStyle::PipeDelimited => "pipeDelimited",
        QueryStyle::DeepObject => "deepObject",
    }
}

fn parse_parameters(
    components: &Components,
    entries: &[ReferenceOr<openapiv3::Parameter>],
    context: &str,
) -> Result<Vec<Parameter>, FetchError> {
    let mut params = Vec::with_capacity(entries.len());

    for entry in entries {
        let param = resolve(
            entry,
            "parameters",
            |name| components.parameters.get(name),
            context,
        )?;

        let (data, location, style) = match param {
            openapiv3::Parameter::Query {
                parameter_data,
                style,
                ..
            } => (
                parameter_data,
                ParamLocation::Query,
                Some(query_style_name(style).to_string()),
            ),
            openapiv3::Parameter::Header { parameter_data, .. } => {
                (parameter_data, ParamLocation::Header, None)
            }
            openapiv3::Parameter::Path { parameter_data, .. } => {
                (parameter_data, ParamLocation::Path, None)
            }
            openapiv3::Parameter::Cookie { parameter_data, .. } => {
                (parameter_data, ParamLocation::Cookie, None)
            }
        };

        // These headers are controlled by the HTTP layer, not the caller
        if location == ParamLocation::Header
            && ["accept", "content-type", "authorization"]
                .contains(&data.name.to_lowercase().as_str())
        {
            continue;
        }

        let schema = match &data.format {
            ParameterSchemaOrContent::Schema(schema) => schema_value(schema, context)?,
            ParameterSchemaOrContent::Content(content) => {
                match content.values().next().and_then(|media| media.schema.as_ref()) {
                    Some(schema) => schema_value(schema, context)?,
                    None => json!({"type": "string"}),
                }
            }
        };

        params.push(Parameter {
            name: data.name.clone(),
            location,
            required: data.required || location == ParamLocation::Path,
            schema,
            description: data.description.clone(),
            style,
            explode: data.explode,
        });
    }

    Ok(params)
}

/// Merge path-level and operation-level parameters
///
/// An operation parameter replaces a path-level one with the same name and
/// location, keeping the path-level position.
fn merge_parameters(shared: &[Parameter], own: Vec<Parameter>) -> Vec<Parameter> {
    let mut merged = shared.to_vec();
    for param in own {
        match merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(existing) => *existing = param,
            None => merged.push(param),
        }
    }
    merged
}

fn build_operation(
    components: &Components,
    method: HttpMethod,
    path: &str,
    op: &openapiv3::Operation,
    shared_params: &[Parameter],
) -> Result<Operation, FetchError> {
    let context = format!("{} {}", method, path);

    let own_params = parse_parameters(components, &op.parameters, &context)?;
    let parameters = merge_parameters(shared_params, own_params);

    let request_body = match &op.request_body {
        Some(entry) => {
            let body = resolve(
                entry,
                "requestBodies",
                |name| components.request_bodies.get(name),
                &context,
            )?;

            let mut content = Vec::with_capacity(body.content.len());
            for (content_type, media) in &body.content {
                let schema = match &media.schema {
                    Some(schema) => schema_value(schema, &context)?,
                    None => json!({}),
                };
                content.push(MediaType {
                    content_type: content_type.clone(),
                    schema,
                });
            }

            Some(RequestBody {
                required: body.required,
                description: body.description.clone(),
                content,
            })
        }
        None => None,
    };

    let response_schema = success_response_schema(components, &op.responses, &context)?;

    Ok(Operation {
        method,
        path: path.to_string(),
        operation_id: op.operation_id.clone(),
        summary: op.summary.clone(),
        description: op.description.clone(),
        deprecated: op.deprecated,
        parameters,
        request_body,
        response_schema,
    })
}

fn success_response_schema(
    components: &Components,
    responses: &Responses,
    context: &str,
) -> Result<Option<Value>, FetchError> {
    for (status, entry) in responses.responses.iter() {
        let success = match status {
            StatusCode::Code(code) => (200..300).contains(code),
            StatusCode::Range(range) => *range == 2,
        };
        if !success {
            continue;
        }

        let response = resolve(
            entry,
            "responses",
            |name| components.responses.get(name),
            context,
        )?;
        if let Some(schema) = response
            .content
            .get("application/json")
            .and_then(|media| media.schema.as_ref())
        {
            return schema_value(schema, context).map(Some);
        }
    }
    Ok(None)
}
