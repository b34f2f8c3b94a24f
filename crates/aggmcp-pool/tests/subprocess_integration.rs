//! Exercises `BackendPool` against a real subprocess: connect, list the
//! namespaced tools, and dispatch a namespaced `tools/call` end to end.

use std::collections::HashMap;
use std::time::Duration;

use aggmcp_domain::backend::{BackendDefinition, LaunchDescriptor};
use aggmcp_pool::pool::BackendPool;
use serde_json::json;

fn fixture_definition() -> BackendDefinition {
    BackendDefinition {
        id: "fixture".to_owned(),
        launch: LaunchDescriptor::Stdio {
            command: env!("CARGO_BIN_EXE_fixture-mcp-backend").to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
        },
    }
}

#[tokio::test]
async fn connects_and_caches_namespaced_tools() {
    let pool = BackendPool::new(Duration::from_secs(5), Duration::from_millis(50));
    pool.set_definitions(vec![fixture_definition()]);

    pool.connect("fixture").await.expect("fixture backend should connect");

    let tools = pool.get_tools(&["fixture".to_owned()]).await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], json!("fixture::echo"));

    pool.dispose().await;
}

#[tokio::test]
async fn dispatches_namespaced_tool_call_and_returns_backend_result_unchanged() {
    let pool = BackendPool::new(Duration::from_secs(5), Duration::from_millis(50));
    pool.set_definitions(vec![fixture_definition()]);
    pool.connect("fixture").await.expect("fixture backend should connect");

    let arguments = json!({ "greeting": "hello" });
    let result = pool.call_tool("fixture::echo", arguments.clone()).await.unwrap();

    assert_eq!(result["isError"], json!(false));
    let text = result["content"][0]["text"].as_str().unwrap();
    assert_eq!(text, arguments.to_string());

    pool.dispose().await;
}

#[tokio::test]
async fn calling_an_unknown_tool_on_a_connected_backend_is_an_error_result() {
    let pool = BackendPool::new(Duration::from_secs(5), Duration::from_millis(50));
    pool.set_definitions(vec![fixture_definition()]);
    pool.connect("fixture").await.expect("fixture backend should connect");

    let result = pool.call_tool("fixture::not_a_real_tool", json!({})).await.unwrap();
    assert_eq!(result["isError"], json!(true));

    pool.dispose().await;
}
