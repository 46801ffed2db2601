//! Live MCP sessions against `ToolServer` over an in-process duplex pipe

use rmcp::model::{CallToolRequest, CallToolRequestParams, ClientRequest, ListToolsResult};
use rmcp::service::{NotificationContext, PeerRequestOptions, RunningService};
use rmcp::{ClientHandler, RoleClient, ServiceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use token_api_mcp::mcp::ToolServer;
use token_api_mcp::openapi::SpecDocument;
use token_api_mcp::tools::{Dispatcher, ToolRegistry, ToolSnapshot, ToolSynthesizer};

/// Client that reports every `tools/list_changed` it receives
struct ListChangedWatcher {
    changed: mpsc::UnboundedSender<()>,
}

impl ClientHandler for ListChangedWatcher {
    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        let _ = self.changed.send(());
    }
}

type Client = RunningService<RoleClient, ListChangedWatcher>;

async fn connect(server: ToolServer) -> (Client, mpsc::UnboundedReceiver<()>) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        if let Ok(running) = server.serve(server_io).await {
            let _ = running.waiting().await;
        }
    });

    let (changed, notifications) = mpsc::unbounded_channel();
    let client = ListChangedWatcher { changed }
        .serve(client_io)
        .await
        .unwrap();
    (client, notifications)
}

fn snapshot(version: &str, operations: &[(&str, &str)]) -> ToolSnapshot {
    let mut paths = serde_json::Map::new();
    for (operation_id, path) in operations {
        paths.insert(
            path.to_string(),
            json!({"get": {"operationId": operation_id, "responses": {}}}),
        );
    }
    let document = SpecDocument::from_value(json!({
        "openapi": "3.0.3",
        "info": {"title": "Token API", "version": version},
        "paths": paths
    }))
    .unwrap();
    ToolSynthesizer::default().synthesize(&document).unwrap()
}

fn names(listed: &ListToolsResult) -> Vec<String> {
    listed.tools.iter().map(|t| t.name.to_string()).collect()
}

fn dispatcher(registry: Arc<ToolRegistry>, base_url: &str) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(registry, base_url, None, Duration::from_secs(60)).unwrap())
}

/// API that accepts one request and never answers
///
/// Fires `arrived` once the request is read and `hung_up` when the caller
/// closes the connection.
async fn silent_api() -> (String, oneshot::Receiver<()>, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (arrived_tx, arrived) = oneshot::channel();
    let (hung_up_tx, hung_up) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = arrived_tx.send(());
        while let Ok(n) = socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
        let _ = hung_up_tx.send(());
    });

    (format!("http://{}", addr), arrived, hung_up)
}

#[tokio::test]
async fn reload_is_announced_once_per_session() {
    let registry = Arc::new(ToolRegistry::new(snapshot(
        "1.0.0",
        &[("get_tokens", "/tokens")],
    )));
    let server = ToolServer::new(
        dispatcher(registry.clone(), "http://127.0.0.1:9"),
        "http://127.0.0.1:9",
    );
    let (client, mut changed) = connect(server).await;

    let listed = client.list_tools(Default::default()).await.unwrap();
    assert_eq!(names(&listed), vec!["get_tokens"]);
    assert!(timeout(Duration::from_millis(200), changed.recv())
        .await
        .is_err());

    registry.install(snapshot(
        "2.0.0",
        &[("get_holders", "/holders"), ("get_transfers", "/transfers")],
    ));

    let listed = client.list_tools(Default::default()).await.unwrap();
    assert_eq!(names(&listed), vec!["get_holders", "get_transfers"]);
    timeout(Duration::from_secs(5), changed.recv())
        .await
        .expect("no tools/list_changed after reload")
        .expect("watcher channel closed");

    // Already told about this generation
    client.list_tools(Default::default()).await.unwrap();
    assert!(timeout(Duration::from_millis(200), changed.recv())
        .await
        .is_err());

    let _ = client.cancel().await;
}

#[tokio::test]
async fn client_cancel_abandons_the_api_request() {
    let (api, arrived, hung_up) = silent_api().await;
    let registry = Arc::new(ToolRegistry::new(snapshot(
        "1.0.0",
        &[("get_tokens", "/tokens")],
    )));
    let (client, _changed) = connect(ToolServer::new(dispatcher(registry, &api), api.clone())).await;

    let call = client
        .send_cancellable_request(
            ClientRequest::CallToolRequest(CallToolRequest {
                method: Default::default(),
                params: CallToolRequestParams {
                    meta: None,
                    name: "get_tokens".into(),
                    arguments: None,
                    task: None,
                },
                extensions: Default::default(),
            }),
            PeerRequestOptions::no_options(),
        )
        .await
        .unwrap();

    timeout(Duration::from_secs(5), arrived)
        .await
        .expect("call never reached the API")
        .unwrap();

    call.cancel(Some("user aborted".into())).await.unwrap();

    timeout(Duration::from_secs(5), hung_up)
        .await
        .expect("API request still open after cancellation")
        .unwrap();

    // The session keeps serving after the cancelled call
    let listed = client.list_tools(Default::default()).await.unwrap();
    assert_eq!(names(&listed), vec!["get_tokens"]);

    let _ = client.cancel().await;
}
