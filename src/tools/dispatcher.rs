//! Invocation dispatcher
//!
//! Resolves a tool name against the current snapshot, validates the
//! arguments and issues exactly one HTTP request to the remote API.

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::descriptor::{ArgumentTarget, BodyEncoding, QueryStyle, ToolDescriptor};
use super::registry::ToolRegistry;
use super::validation::{json_type, validate_arguments};
use crate::core::{ArgumentProblem, InvocationError};

/// Everything except the RFC 3986 unreserved characters
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `application/x-www-form-urlencoded` value encoding
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// Characters outside the RFC 6265 `cookie-octet` range, plus `%`
const COOKIE_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b',')
    .add(b';')
    .add(b'\\');

/// Successful response of the remote API
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// The body as a JSON object, when the tool declares an output schema
    pub structured: Option<Value>,
}

impl InvocationResult {
    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Turns tool calls into HTTP requests
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher calling `base_url` with a client-wide timeout
    pub fn new(
        registry: Arc<ToolRegistry>,
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            registry,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            timeout,
        })
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invoke a tool by name
    ///
    /// The descriptor is taken from a single snapshot read, so a reload
    /// during the call does not affect it. No retries.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<InvocationResult, InvocationError> {
        let tool = self
            .registry
            .current()
            .get(name)
            .ok_or_else(|| InvocationError::UnknownTool(name.to_string()))?;

        let args = validate_arguments(&tool, arguments).map_err(|problems| {
            InvocationError::BadArguments {
                tool: tool.name.clone(),
                problems,
            }
        })?;

        let request = self.build_request(&tool, &args)?;

        tracing::debug!(
            "[Dispatcher] {} -> {} {}",
            tool.name,
            request.method(),
            request.url()
        );

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.transport_error(&tool, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&tool, e))?;

        if !status.is_success() {
            tracing::warn!(
                "[Dispatcher] {} failed with HTTP {}",
                tool.name,
                status.as_u16()
            );
            return Err(InvocationError::RemoteError {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            "[Dispatcher] {} returned HTTP {} ({} bytes)",
            tool.name,
            status.as_u16(),
            body.len()
        );

        let structured = tool
            .output_schema
            .as_ref()
            .and_then(|_| serde_json::from_str::<Value>(&body).ok())
            .filter(Value::is_object);

        Ok(InvocationResult {
            status: status.as_u16(),
            content_type,
            body,
            structured,
        })
    }

    fn transport_error(&self, tool: &ToolDescriptor, e: reqwest::Error) -> InvocationError {
        let message = if e.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs_f64())
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        tracing::warn!("[Dispatcher] {} transport error: {}", tool.name, message);
        InvocationError::TransportError(message)
    }

    /// Build the HTTP request for validated arguments
    pub fn build_request(
        &self,
        tool: &ToolDescriptor,
        args: &Map<String, Value>,
    ) -> Result<reqwest::Request, InvocationError> {
        let binding = &tool.binding;
        let mut path = binding.path_template.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(HeaderName, HeaderValue)> = Vec::new();
        let mut cookies: Vec<String> = Vec::new();
        let mut body_fields = Map::new();
        let mut whole_body: Option<&Value> = None;

        for arg in &binding.arguments {
            let Some(value) = args.get(&arg.argument) else {
                continue;
            };

            match &arg.target {
                ArgumentTarget::Path { name } => {
                    let encoded = utf8_percent_encode(&scalar_text(value), PATH_SEGMENT).to_string();
                    path = path.replace(&format!("{{{}}}", name), &encoded);
                }
                ArgumentTarget::Query {
                    name,
                    style,
                    explode,
                } => push_query(&mut query, name, value, *style, *explode),
                ArgumentTarget::Header { name } => {
                    if value.is_null() {
                        continue;
                    }
                    let header = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| bad_header(tool, &arg.argument, value))?;
                    let text = HeaderValue::from_str(&scalar_text(value))
                        .map_err(|_| bad_header(tool, &arg.argument, value))?;
                    headers.push((header, text));
                }
                ArgumentTarget::Cookie { name } => {
                    if !value.is_null() {
                        let raw = scalar_text(value);
                        let encoded = utf8_percent_encode(&raw, COOKIE_VALUE);
                        cookies.push(format!("{}={}", name, encoded));
                    }
                }
                ArgumentTarget::BodyField { name } => {
                    body_fields.insert(name.clone(), value.clone());
                }
                ArgumentTarget::Body => whole_body = Some(value),
            }
        }

        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(binding.method.to_reqwest(), &url)
            .query(&query);

        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies.join("; "));
        }

        if let Some(body) = &binding.body {
            // A required body goes out even when every field was left out
            let payload = match whole_body {
                Some(value) => Some(value.clone()),
                None if !body_fields.is_empty() || body.required => {
                    Some(Value::Object(body_fields))
                }
                None => None,
            };

            if let Some(payload) = payload {
                let bytes = match body.encoding {
                    BodyEncoding::Json => payload.to_string(),
                    BodyEncoding::Form => form_encode(&payload),
                    BodyEncoding::Text => scalar_text(&payload),
                };
                builder = builder
                    .header(CONTENT_TYPE, body.content_type.as_str())
                    .body(bytes);
            }
        }

        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        builder.build().map_err(|e| {
            InvocationError::TransportError(format!("invalid request URL '{}': {}", url, e))
        })
    }
}

fn bad_header(tool: &ToolDescriptor, field: &str, value: &Value) -> InvocationError {
    InvocationError::BadArguments {
        tool: tool.name.clone(),
        problems: vec![ArgumentProblem::TypeMismatch {
            field: field.to_string(),
            expected: "header-safe string".to_string(),
            actual: json_type(value).to_string(),
        }],
    }
}

/// Text form of a value: strings raw, arrays comma-joined, others as JSON
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_query(
    query: &mut Vec<(String, String)>,
    name: &str,
    value: &Value,
    style: QueryStyle,
    explode: bool,
) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            let items = items.iter().filter(|v| !v.is_null());
            let delimiter = match style {
                QueryStyle::SpaceDelimited => " ",
                QueryStyle::PipeDelimited => "|",
                _ => ",",
            };
            if explode || style == QueryStyle::DeepObject {
                for item in items {
                    query.push((name.to_string(), scalar_text(item)));
                }
            } else {
                let joined = items.map(scalar_text).collect::<Vec<_>>().join(delimiter);
                query.push((name.to_string(), joined));
            }
        }
        Value::Object(fields) => {
            for (key, field) in fields.iter().filter(|(_, v)| !v.is_null()) {
                let key = match style {
                    QueryStyle::DeepObject => format!("{}[{}]", name, key),
                    _ => key.clone(),
                };
                query.push((key, scalar_text(field)));
            }
        }
        scalar => query.push((name.to_string(), scalar_text(scalar))),
    }
}

fn form_encode(payload: &Value) -> String {
    let encode = |s: &str| utf8_percent_encode(s, FORM_VALUE).to_string().replace("%20", "+");

    match payload {
        Value::Object(fields) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{}={}", encode(k), encode(&scalar_text(v))))
            .collect::<Vec<_>>()
            .join("&"),
        other => encode(&scalar_text(other)),
    }
}
