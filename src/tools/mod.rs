//! Tool system
//!
//! This module provides:
//! - `ToolDescriptor` - A synthesized tool and the HTTP call behind it
//! - `ToolSynthesizer` - Builds descriptors from an OpenAPI document
//! - `ToolRegistry` / `ToolSnapshot` - Atomically swappable set of tools
//! - `Dispatcher` - Turns a tool call into one HTTP request

mod descriptor;
mod dispatcher;
mod registry;
mod synthesizer;
mod validation;

pub use descriptor::{
    ArgumentBinding, ArgumentTarget, BodyBinding, BodyEncoding, HttpBinding, QueryStyle,
    ToolDescriptor,
};
pub use dispatcher::{Dispatcher, InvocationResult};
pub use registry::{ToolRegistry, ToolSnapshot};
pub use synthesizer::{base_tool_name, ToolSynthesizer, MAX_TOOL_NAME_LEN};
pub use validation::validate_arguments;
