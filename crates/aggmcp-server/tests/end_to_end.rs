//! Drives the full Axum app with `tower::ServiceExt::oneshot`, exercising
//! profile selection, namespacing, context resources and the security
//! sandbox against a real (session-router-backed) stack rather than bare
//! handler units.

use std::sync::Arc;
use std::time::Duration;

use aggmcp_config::{AppConfig, BroadcastEventBus};
use aggmcp_domain::mcp::JsonRpcError;
use aggmcp_domain::profile::shipped_default_document;
use aggmcp_features::{Analytics, CostTracker, PromptLibrary, ResultCache, SecuritySandbox};
use aggmcp_pool::pool::BackendPool;
use aggmcp_profiles::ProfileStore;
use aggmcp_server::sse::SseClients;
use aggmcp_server::SessionRouter;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn shipped_profiles(dir: &tempfile::TempDir) -> Arc<ProfileStore> {
    let path = dir.path().join("profiles.json");
    std::fs::write(&path, serde_json::to_string(&shipped_default_document()).unwrap()).unwrap();
    Arc::new(ProfileStore::load(&path).unwrap())
}

fn test_app(dir: &tempfile::TempDir) -> axum::Router {
    let pool = Arc::new(BackendPool::new(Duration::from_secs(1), Duration::from_millis(1)));
    let profiles = shipped_profiles(dir);
    let prompts = Arc::new(PromptLibrary::new(None));
    let cache = Arc::new(ResultCache::new(100, Duration::from_secs(60)));
    let router = Arc::new(SessionRouter::new(pool, profiles, prompts, Arc::clone(&cache), true, Duration::from_secs(300)));

    aggmcp_server::app(
        router,
        Arc::new(SseClients::new()),
        Arc::new(BroadcastEventBus::new()),
        Arc::new(SecuritySandbox::new(true)),
        Arc::new(Analytics::new()),
        Arc::new(CostTracker::new()),
        cache,
        Arc::new(AppConfig::default()),
        "127.0.0.1".to_owned(),
        0,
    )
}

async fn post_json(app: axum::Router, dir: &tempfile::TempDir, body: Value) -> Value {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .header("x-workspace-id", "ws-1")
                .header("x-workspace-path", dir.path().display().to_string())
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_json(app: axum::Router, uri: &str) -> Value {
    let response = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body()).await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn flutter_workspace_selects_the_flutter_profile() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pubspec.yaml"), "name: demo\n").unwrap();
    let app = test_app(&dir);

    post_json(app.clone(), &dir, json!({"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}})).await;
    let status = get_json(app, "/status").await;

    assert_eq!(status["sessions"][0]["profile_name"], "Flutter/Firebase Projects");
    assert_eq!(
        status["sessions"][0]["enabled_backends"],
        json!(["firebase-mcp", "server-filesystem", "server-git"])
    );
}

#[tokio::test]
async fn notes_only_workspace_falls_back_to_the_default_profile() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "todo\n").unwrap();
    let app = test_app(&dir);

    post_json(app.clone(), &dir, json!({"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}})).await;
    let status = get_json(app, "/status").await;

    assert_eq!(status["sessions"][0]["profile_name"], "Default (Minimal)");
    assert_eq!(status["sessions"][0]["enabled_backends"], json!(["server-filesystem"]));
}

#[tokio::test]
async fn system_context_resource_carries_the_workspace_path_header() {
    let dir = tempfile::tempdir().unwrap();
    let envelope = post_json(
        test_app(&dir),
        &dir,
        json!({"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"workspace://system-context"}}),
    )
    .await;

    let result = &envelope["result"];
    chrono::DateTime::parse_from_rfc3339(result["currentDate"].as_str().unwrap()).unwrap();
    assert_eq!(result["workspace"]["path"], json!(dir.path().display().to_string()));
}

#[tokio::test]
async fn dangerous_shell_command_is_blocked_before_reaching_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&dir);

    let envelope = post_json(
        app.clone(),
        &dir,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "server-git::run_command", "arguments": { "command": "rm -rf /" } },
        }),
    )
    .await;

    assert_eq!(envelope["error"]["code"], JsonRpcError::SECURITY_BLOCKED);
    assert!(envelope["error"]["message"].as_str().unwrap().starts_with("Security:"));

    let security = get_json(app, "/security").await;
    assert_eq!(security["violations"].as_array().unwrap().len(), 1);
}
