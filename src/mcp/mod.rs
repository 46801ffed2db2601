//! MCP (Model Context Protocol) surface
//!
//! - `ToolServer`: rmcp `ServerHandler` serving the current tool snapshot
//! - `build_router` / `serve`: streamable HTTP endpoint plus `/health`
//!
//! # Tool List Changes
//!
//! The server declares the `tools.listChanged` capability. Each session
//! remembers the registry generation it last saw and receives a
//! `notifications/tools/list_changed` on its first request after a reload.

mod server;
mod transport;

pub use server::{to_call_result, to_mcp_tool, ToolServer, SERVER_NAME};
pub use transport::{build_router, serve, shutdown_signal};
