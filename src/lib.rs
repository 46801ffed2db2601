pub mod core;
pub mod openapi;
pub mod runtime;
pub mod tools;

// Logging setup for the binary
pub mod logging;

// MCP (Model Context Protocol) surface
pub mod mcp;
