//! Tool descriptor definition
//!
//! A descriptor is everything needed to advertise a tool and to turn a call
//! into exactly one HTTP request.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::openapi::HttpMethod;

/// Query serialization style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum QueryStyle {
    #[default]
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl QueryStyle {
    /// Parse an OpenAPI `style` value, falling back to `form`
    pub fn from_openapi(style: Option<&str>) -> Self {
        match style {
            Some("spaceDelimited") => QueryStyle::SpaceDelimited,
            Some("pipeDelimited") => QueryStyle::PipeDelimited,
            Some("deepObject") => QueryStyle::DeepObject,
            _ => QueryStyle::Form,
        }
    }
}

/// Where an argument ends up in the HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "in", rename_all = "snake_case")]
pub enum ArgumentTarget {
    /// Substituted into `{name}` in the path template
    Path { name: String },
    Query {
        name: String,
        style: QueryStyle,
        explode: bool,
    },
    Header { name: String },
    Cookie { name: String },
    /// One property of a flattened object body
    BodyField { name: String },
    /// The whole request body
    Body,
}

/// Binding of one tool argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentBinding {
    /// Name of the argument in the tool's input schema
    pub argument: String,
    #[serde(flatten)]
    pub target: ArgumentTarget,
}

/// How the request body is serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    Json,
    Form,
    Text,
}

/// Request body binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodyBinding {
    pub content_type: String,
    pub encoding: BodyEncoding,
    /// `requestBody.required`: send an empty body when no field is given
    pub required: bool,
}

/// The HTTP call behind a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpBinding {
    pub method: HttpMethod,
    pub path_template: String,
    /// One entry per input schema property, in schema order
    pub arguments: Vec<ArgumentBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyBinding>,
}

/// A synthesized tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Unique name within a snapshot
    pub name: String,
    pub description: String,
    /// JSON schema object describing the arguments
    pub input_schema: Map<String, Value>,
    /// JSON schema object describing a successful response, if declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Map<String, Value>>,
    pub binding: HttpBinding,
}

impl ToolDescriptor {
    /// `METHOD /path` of the bound operation
    pub fn operation_label(&self) -> String {
        format!("{} {}", self.binding.method, self.binding.path_template)
    }

    /// Properties of the input schema
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.input_schema.get("properties").and_then(Value::as_object)
    }

    /// Schema of a single argument
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|props| props.get(name))
    }

    /// Names of required arguments, in schema order
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_accessors() {
        let descriptor = ToolDescriptor {
            name: "get_pet".into(),
            description: "Get a pet".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "petId": {"type": "string"},
                    "verbose": {"type": "boolean"}
                },
                "required": ["petId"]
            })
            .as_object()
            .unwrap()
            .clone(),
            output_schema: None,
            binding: HttpBinding {
                method: HttpMethod::Get,
                path_template: "/pets/{petId}".into(),
                arguments: vec![],
                body: None,
            },
        };

        assert_eq!(descriptor.operation_label(), "GET /pets/{petId}");
        assert_eq!(descriptor.required(), vec!["petId"]);
        assert_eq!(descriptor.property("verbose").unwrap()["type"], "boolean");
        assert!(descriptor.property("missing").is_none());
    }

    #[test]
    fn test_binding_serializes_location_tag() {
        let binding = ArgumentBinding {
            argument: "network".into(),
            target: ArgumentTarget::Query {
                name: "network".into(),
                style: QueryStyle::Form,
                explode: true,
            },
        };
        assert_eq!(
            serde_json::to_value(&binding).unwrap(),
            json!({"argument": "network", "in": "query", "name": "network", "style": "form", "explode": true})
        );
    }

    #[test]
    fn test_query_style_parsing() {
        assert_eq!(QueryStyle::from_openapi(None), QueryStyle::Form);
        assert_eq!(
            QueryStyle::from_openapi(Some("deepObject")),
            QueryStyle::DeepObject
        );
        assert_eq!(QueryStyle::from_openapi(Some("matrix")), QueryStyle::Form);
    }
}
