//! End-to-end turns against a real filesystem bridge on an ephemeral port.

use std::path::Path;
use std::sync::Arc;

use agent_gateway::server::{self, ChatRequest, HealthResponse};
use agent_gateway::{
    filesystem_toolkit, AgentLoop, BridgeClient, ChatOutcome, ConversationStore, FsBridge,
    Gateway, InMemoryConversationStore, Message, ModelCompletion, Role, StubModel, ToolCall,
    ToolRegistry, TurnExecutor, ERROR_MARKER, MAX_READ_CHARS, NO_FILES_SENTINEL,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn spawn_bridge(root: &Path) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(FsBridge::new(root).serve_with_listener(listener));
    format!("http://{addr}")
}

async fn toolkit_for(root: &Path) -> ToolRegistry {
    filesystem_toolkit(BridgeClient::new(spawn_bridge(root).await)).unwrap()
}

fn seeded_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
    dir
}

fn scripted_gateway(
    tools: ToolRegistry,
    script: Vec<ModelCompletion>,
) -> (Arc<Gateway<StubModel>>, InMemoryConversationStore) {
    let store = InMemoryConversationStore::new();
    let agent = AgentLoop::new(StubModel::new(script), TurnExecutor::new(Arc::new(tools)));
    (Arc::new(Gateway::new(agent, Arc::new(store.clone()))), store)
}

#[tokio::test]
async fn list_the_files_scenario() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;
    let final_text = "Found 2 files, via list_files: a.txt, b.txt.";
    let (gateway, store) = scripted_gateway(
        tools,
        vec![
            ModelCompletion::tool_calls(vec![ToolCall::new("", "list_files", json!({}))]),
            ModelCompletion::text(final_text),
        ],
    );

    let outcome = gateway.chat("c1", "list the files").await.unwrap();

    assert_eq!(outcome.reply, final_text);
    assert_eq!(
        outcome.turn_messages,
        vec!["user", "assistant_tool_call", "tool", "assistant"]
    );
    let history = store.get_or_create("c1").await.unwrap();
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(history[2].content, "Tool list_files output:\na.txt\nb.txt");
}

#[tokio::test]
async fn read_file_reaches_bridge_content() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;

    let output = tools.invoke("read_file", json!({"path": "a.txt"})).await;

    assert_eq!(output, "alpha");
}

#[tokio::test]
async fn traversal_is_reported_as_error_text() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;

    let output = tools
        .invoke("read_file", json!({"path": "../../etc/passwd"}))
        .await;

    assert!(output.starts_with(ERROR_MARKER));
    assert!(output.contains("Path traversal not allowed"));
    assert!(!output.contains("root:"));
}

#[tokio::test]
async fn missing_file_is_reported_as_error_text() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;

    let output = tools.invoke("read_file", json!({"path": "nope.txt"})).await;

    assert_eq!(output, "Error reading nope.txt: Not found");
}

#[tokio::test]
async fn empty_root_lists_sentinel() {
    let root = tempfile::tempdir().unwrap();
    let tools = toolkit_for(root.path()).await;

    let output = tools.invoke("list_files", json!({})).await;

    assert_eq!(output, NO_FILES_SENTINEL);
}

#[tokio::test]
async fn list_files_accepts_blank_arguments() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;

    let output = tools.invoke("list_files", json!("")).await;

    assert_eq!(output, "a.txt\nb.txt");
}

#[tokio::test]
async fn large_files_are_capped() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("big.txt"), "x".repeat(MAX_READ_CHARS + 500)).unwrap();
    let tools = toolkit_for(root.path()).await;

    let output = tools.invoke("read_file", json!({"path": "big.txt"})).await;

    assert_eq!(output.chars().count(), MAX_READ_CHARS);
}

#[tokio::test]
async fn read_file_without_path_is_an_error_observation() {
    let root = seeded_root();
    let tools = toolkit_for(root.path()).await;
    let executor = TurnExecutor::new(Arc::new(tools));
    let request = Message::assistant_with_tools(
        "",
        vec![
            ToolCall::new("c1", "read_file", json!({})),
            ToolCall::new("c2", "read_file", json!({"path": "b.txt"})),
        ],
    );

    let observations = TurnExecutor::observations(&executor.execute(&request).await);

    assert!(observations[0]
        .content
        .starts_with("Tool read_file error: invalid arguments"));
    assert_eq!(observations[1].content, "Tool read_file output:\nbeta");
}

#[tokio::test]
async fn bridge_health_reports_root() {
    let root = seeded_root();
    let client = BridgeClient::new(spawn_bridge(root.path()).await);

    let health = client.health().await.unwrap();

    assert_eq!(health.status, "ok");
    assert_eq!(health.root, root.path().display().to_string());
    assert_eq!(client.list().await.unwrap(), vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn http_surface_serves_health_and_chat() {
    let (gateway, _) = scripted_gateway(
        ToolRegistry::new(),
        vec![ModelCompletion::text("Hello from the gateway.")],
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(server::serve_with_listener(gateway, listener));
    let http = reqwest::Client::new();

    let health: HealthResponse = http
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.model, "stub-model");

    let outcome: ChatOutcome = http
        .post(format!("{base}/chat"))
        .json(&ChatRequest {
            conversation_id: "web-1".into(),
            message: "hello".into(),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Hello from the gateway.");
    assert_eq!(outcome.turn_messages, vec!["user", "assistant"]);

    let rejected = http
        .post(format!("{base}/chat"))
        .json(&json!({"conversation_id": "web-1", "message": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);

    let exhausted = http
        .post(format!("{base}/chat"))
        .json(&json!({"conversation_id": "web-2", "message": "again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(exhausted.status(), reqwest::StatusCode::BAD_GATEWAY);
}
