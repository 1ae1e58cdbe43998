//! End-to-end client flows against the sh fake server.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use mcp_inspector::client::{result_items, McpClient};
use mcp_inspector::observer::{NullObserver, Observer};
use mcp_inspector::rpc::orchestrator::CallOutcome;
use mcp_inspector::rpc::policy::NoExtension;
use mcp_inspector::schema::build_arguments;
use mcp_inspector::servers::ServerRegistry;
use mcp_inspector::AppError;

use super::test_helpers::{fast_settings, Event, RecordingObserver, FAKE_MCP_SERVER};

fn registry(dir: &Path, names: &[&str]) -> ServerRegistry {
    let servers: Map<String, Value> = names
        .iter()
        .map(|name| {
            (
                (*name).to_owned(),
                json!({ "command": "sh", "args": ["-c", FAKE_MCP_SERVER, name] }),
            )
        })
        .collect();
    let raw = json!({ "mcpServers": servers }).to_string();
    ServerRegistry::from_json_str(&raw, dir).expect("registry")
}

async fn connect(registry: ServerRegistry, server: Option<&str>) -> McpClient {
    connect_observed(registry, server, Arc::new(NullObserver)).await
}

async fn connect_observed(
    registry: ServerRegistry,
    server: Option<&str>,
    observer: Arc<dyn Observer>,
) -> McpClient {
    McpClient::connect(
        registry,
        server,
        fast_settings(),
        observer,
        Arc::new(NoExtension),
    )
    .await
    .expect("connected")
}

#[tokio::test]
async fn list_then_call_tool() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = connect(registry(dir.path(), &["alpha"]), None).await;

    let listed = client.list_tools().await.expect("written").into_result().expect("resolved");
    let tools = result_items(&listed, "tools");
    assert_eq!(tools.len(), 1);

    let tool = client.find_tool("echo").await.expect("tool exists");
    let arguments = build_arguments(&tool["inputSchema"], &[]);
    assert_eq!(arguments.get("text"), Some(&json!("")));

    let outcome = client.call_tool("echo", arguments).await.expect("written");
    let CallOutcome::Resolved(result) = outcome else {
        panic!("expected a result, got {outcome:?}");
    };
    assert_eq!(result["content"][0]["text"], "called");
    client.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = connect(registry(dir.path(), &["alpha"]), None).await;

    let err = client.find_tool("missing").await.expect_err("no such tool");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");
    client.shutdown().await;
}

#[tokio::test]
async fn resources_and_unsupported_prompts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = connect(registry(dir.path(), &["alpha"]), None).await;

    let resources = client
        .list_resources()
        .await
        .expect("written")
        .into_result()
        .expect("resolved");
    assert_eq!(result_items(&resources, "resources")[0]["uri"], "file:///readme");

    let outcome = client.read_resource("file:///readme").await.expect("written");
    assert!(matches!(outcome, CallOutcome::ProtocolError(_)));

    let prompts = client.list_prompts().await.expect("written").into_result().expect("resolved");
    assert!(result_items(&prompts, "prompts").is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn connect_selects_server_by_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = connect(registry(dir.path(), &["alpha", "beta"]), Some("beta")).await;

    assert_eq!(client.session().name(), "beta");
    assert_eq!(client.server_info()["serverInfo"]["name"], "beta");
    client.shutdown().await;
}

#[tokio::test]
async fn unknown_server_name_fails_to_connect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = McpClient::connect(
        registry(dir.path(), &["alpha"]),
        Some("gamma"),
        fast_settings(),
        Arc::new(NullObserver),
        Arc::new(NoExtension),
    )
    .await
    .expect_err("unknown server");

    assert!(matches!(err, AppError::NotFound(_)), "{err}");
}

/// Switching stops the old process and starts from empty histories.
#[tokio::test]
async fn switch_replaces_session_and_histories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = connect(registry(dir.path(), &["alpha", "beta"]), Some("alpha")).await;
    client.list_tools().await.expect("written");
    let before = client.session().snapshot().replies.len();
    assert!(before >= 2);

    client.switch("beta").await.expect("switched");

    assert_eq!(client.session().name(), "beta");
    assert_eq!(client.server_info()["serverInfo"]["name"], "beta");
    let replies = client.session().snapshot().replies;
    assert_eq!(replies.len(), 1, "only beta's initialize reply: {replies:?}");
    assert!(replies[0].contains("\"beta\""));
    client.shutdown().await;
}

/// Observers are told about the switch before the new server starts talking.
#[tokio::test]
async fn switch_retags_the_observer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let observer = Arc::new(RecordingObserver::default());
    let mut client = connect_observed(
        registry(dir.path(), &["alpha", "beta"]),
        Some("alpha"),
        observer.clone(),
    )
    .await;

    client.switch("beta").await.expect("switched");

    let events = observer.events();
    let changed = events
        .iter()
        .position(|e| *e == Event::ServerChanged("beta".into()))
        .expect("server change reported");
    let beta_reply = events
        .iter()
        .rposition(|e| matches!(e, Event::Reply(line) if line.contains("\"beta\"")))
        .expect("beta answered initialize");
    assert!(changed < beta_reply);
    client.shutdown().await;
}
