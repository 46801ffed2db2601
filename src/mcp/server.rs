//! MCP server handler
//!
//! Exposes the current tool snapshot over MCP. One `ToolServer` is created
//! per session; all of them share the registry and the dispatcher.

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{Peer, RequestContext};
use rmcp::{RoleServer, ServerHandler};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::InvocationError;
use crate::tools::{Dispatcher, InvocationResult, ToolDescriptor};

/// Server name announced during initialization
pub const SERVER_NAME: &str = "token-api-mcp";

/// Convert a descriptor into its MCP tool definition
pub fn to_mcp_tool(descriptor: &ToolDescriptor) -> Tool {
    Tool {
        name: descriptor.name.clone().into(),
        title: None,
        description: Some(descriptor.description.clone().into()),
        input_schema: Arc::new(descriptor.input_schema.clone()),
        output_schema: descriptor.output_schema.clone().map(Arc::new),
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// Map a dispatcher outcome onto the MCP result space
///
/// Remote and transport failures are tool-level errors the model can read;
/// unknown tools and bad arguments are protocol errors.
pub fn to_call_result(
    outcome: Result<InvocationResult, InvocationError>,
) -> Result<CallToolResult, ErrorData> {
    match outcome {
        Ok(result) => {
            let mut call_result = CallToolResult::success(vec![Content::text(result.body)]);
            call_result.structured_content = result.structured;
            Ok(call_result)
        }
        Err(e) => {
            let message = e.to_string();
            match e {
                InvocationError::UnknownTool(name) => Err(ErrorData::invalid_params(
                    message,
                    Some(json!({ "tool": name })),
                )),
                InvocationError::BadArguments { tool, problems } => Err(ErrorData::invalid_params(
                    message,
                    Some(json!({ "tool": tool, "problems": problems })),
                )),
                InvocationError::RemoteError { .. } | InvocationError::TransportError(_) => {
                    Ok(CallToolResult::error(vec![Content::text(message)]))
                }
            }
        }
    }
}

/// Per-session MCP handler
pub struct ToolServer {
    dispatcher: Arc<Dispatcher>,
    base_url: String,
    /// Registry generation this session was last told about
    seen_generation: AtomicU64,
}

impl ToolServer {
    pub fn new(dispatcher: Arc<Dispatcher>, base_url: impl Into<String>) -> Self {
        let seen_generation = AtomicU64::new(dispatcher.registry().generation());
        Self {
            dispatcher,
            base_url: base_url.into(),
            seen_generation,
        }
    }

    /// Tell the session its tool list changed, once per reload it missed
    async fn announce_reload(&self, peer: &Peer<RoleServer>, current: u64) {
        let previous = self.seen_generation.swap(current, Ordering::AcqRel);
        if previous == current {
            return;
        }

        tracing::debug!(
            "[ToolServer] Registry moved from generation {} to {}, notifying session",
            previous,
            current
        );
        if let Err(e) = peer.notify_tool_list_changed().await {
            tracing::warn!("[ToolServer] Failed to send tools/list_changed: {}", e);
        }
    }

    /// Run one tool call, giving up as soon as `ct` is cancelled
    ///
    /// Cancelling drops the in-flight HTTP request.
    pub async fn call_until_cancelled(
        &self,
        request: CallToolRequestParams,
        ct: &CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        let name = request.name.to_string();
        let arguments = request.arguments.map(Value::Object);

        tracing::info!("[ToolServer] Calling tool '{}'", name);

        let outcome = tokio::select! {
            _ = ct.cancelled() => {
                tracing::info!("[ToolServer] Call to '{}' cancelled by client", name);
                return Err(ErrorData::internal_error("request cancelled", None));
            }
            outcome = self.dispatcher.invoke(&name, arguments) => outcome,
        };

        if let Err(e) = &outcome {
            tracing::debug!("[ToolServer] Tool '{}' failed: {}", name, e);
        }

        to_call_result(outcome)
    }
}

impl ServerHandler for ToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            instructions: Some(format!(
                "Tools generated from the OpenAPI description of the Token API at {}. \
                 Each tool performs one HTTP request and returns the response body.",
                self.base_url
            )),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let snapshot = self.dispatcher.registry().current();
        self.announce_reload(&context.peer, snapshot.generation()).await;

        let tools = snapshot.tools().iter().map(|t| to_mcp_tool(t)).collect();

        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let generation = self.dispatcher.registry().generation();
        self.announce_reload(&context.peer, generation).await;

        self.call_until_cancelled(request, &context.ct).await
    }
}
