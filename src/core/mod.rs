//! Core types shared by every component
//!
//! - `ServerConfig` - Configuration loaded from the environment
//! - `FetchError` / `SynthesisError` / `InvocationError` - Error taxonomy

pub mod config;
pub mod error;

pub use config::{CollisionPolicy, LogFormat, ServerConfig};
pub use error::{ArgumentProblem, ConfigError, FetchError, InvocationError, SynthesisError};
