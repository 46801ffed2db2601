//! Server configuration
//!
//! Everything is read from environment-style key/value pairs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::error::ConfigError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MCP_PATH: &str = "/mcp";
const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// What to do when two operations derive the same tool name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Later declarations get `_2`, `_3`, ... appended
    #[default]
    Suffix,
    /// Synthesis fails
    Reject,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suffix" => Ok(Self::Suffix),
            "reject" | "error" => Ok(Self::Reject),
            other => Err(format!("expected 'suffix' or 'reject', got '{}'", other)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{}'", other)),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root URL of the remote REST API (no trailing slash)
    pub base_url: String,
    /// Bearer token forwarded on every remote call
    pub auth_token: Option<String>,
    /// Location of the OpenAPI document
    pub spec_url: String,
    pub host: String,
    pub port: u16,
    /// Path the MCP endpoint is mounted on
    pub mcp_path: String,
    /// Time between reload cycles
    pub reload_interval: Duration,
    /// Timeout of a single tool invocation request
    pub request_timeout: Duration,
    /// Timeout of a single OpenAPI document fetch
    pub fetch_timeout: Duration,
    pub collision_policy: CollisionPolicy,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get("TOKEN_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let spec_url = get("OPENAPI_SPEC_URL").unwrap_or_else(|| format!("{}/openapi", base_url));

        let reload_interval_secs: u64 = parse_or(
            "VERSION_CHECK_INTERVAL",
            get("VERSION_CHECK_INTERVAL"),
            DEFAULT_RELOAD_INTERVAL_SECS,
        )?;
        if reload_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "VERSION_CHECK_INTERVAL",
                "0",
                "interval must be at least one second",
            ));
        }

        let mut mcp_path = get("MCP_PATH").unwrap_or_else(|| DEFAULT_MCP_PATH.to_string());
        if !mcp_path.starts_with('/') {
            mcp_path.insert(0, '/');
        }

        Ok(Self {
            base_url,
            auth_token: get("TOKEN_API_AUTH_TOKEN"),
            spec_url,
            host: get("MCP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("MCP_PORT", get("MCP_PORT"), DEFAULT_PORT)?,
            mcp_path,
            reload_interval: Duration::from_secs(reload_interval_secs),
            request_timeout: Duration::from_secs(parse_or(
                "TOKEN_API_TIMEOUT",
                get("TOKEN_API_TIMEOUT"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            fetch_timeout: Duration::from_secs(parse_or(
                "OPENAPI_FETCH_TIMEOUT",
                get("OPENAPI_FETCH_TIMEOUT"),
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            collision_policy: parse_or(
                "TOOL_NAME_COLLISION",
                get("TOOL_NAME_COLLISION"),
                CollisionPolicy::default(),
            )?,
            log_format: parse_or("LOG_FORMAT", get("LOG_FORMAT"), LogFormat::default())?,
        })
    }

    /// Address the MCP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, value.clone(), e.to_string())),
        None => Ok(default),
    }
}
