//! Error types
//!
//! One enum per stage of the pipeline: fetching the OpenAPI document, turning it into
//! tools, invoking a tool, and reading configuration.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while retrieving the OpenAPI document
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS or timeout failure
    #[error("Network error fetching OpenAPI spec: {0}")]
    Network(String),

    /// The server answered with a non-2xx status
    #[error("HTTP {status} fetching OpenAPI spec: {body}")]
    BadStatus { status: u16, body: String },

    /// The body is not a well-formed OpenAPI document
    #[error("Invalid OpenAPI spec: {0}")]
    Parse(String),
}

impl FetchError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        FetchError::Parse(msg.into())
    }
}

/// Errors raised while turning a document into tools
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Two operations derived the same tool name
    #[error("Tool name collision: '{name}' derived from both {first} and {second}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    /// An operation uses a schema construct that cannot be exposed as a tool
    #[error("Unsupported schema in {operation}: {reason}")]
    UnsupportedSchema { operation: String, reason: String },
}

impl SynthesisError {
    /// Create an unsupported schema error
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        SynthesisError::UnsupportedSchema {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// A single problem found while validating tool arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum ArgumentProblem {
    /// The arguments are not a JSON object
    NotAnObject { actual: String },

    /// A required field is absent
    Missing { field: String },

    /// A field the tool does not declare
    Unexpected { field: String },

    /// The value has the wrong JSON type
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for ArgumentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentProblem::NotAnObject { actual } => {
                write!(f, "arguments must be an object, got {}", actual)
            }
            ArgumentProblem::Missing { field } => write!(f, "missing required field '{}'", field),
            ArgumentProblem::Unexpected { field } => write!(f, "unexpected field '{}'", field),
            ArgumentProblem::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{}' expected {}, got {}", field, expected, actual),
        }
    }
}

/// Errors raised while invoking a tool
#[derive(Error, Debug)]
pub enum InvocationError {
    /// No tool with this name in the current snapshot
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The arguments do not match the tool's input schema
    #[error("Invalid arguments for tool '{tool}': {}", join_problems(.problems))]
    BadArguments {
        tool: String,
        problems: Vec<ArgumentProblem>,
    },

    /// The remote API answered with a 4xx/5xx status
    #[error("HTTP {status}: {body}")]
    RemoteError { status: u16, body: String },

    /// The request never produced a response (connection failure, timeout)
    #[error("Transport error: {0}")]
    TransportError(String),
}

fn join_problems(problems: &[ArgumentProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
