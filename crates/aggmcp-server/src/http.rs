//! The HTTP/SSE surface: a single JSON-RPC endpoint the Session Router
//! dispatches against, an SSE stream for config-change notifications,
//! and a handful of diagnostic endpoints for the feature side-channels.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use aggmcp_config::{AppConfig, BroadcastEventBus};
use aggmcp_domain::backend::split_namespaced;
use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::events::DomainEvent;
use aggmcp_domain::mcp::{JsonRpcError, JsonRpcMessage};
use aggmcp_features::cost::estimate_tokens;
use aggmcp_features::security::Verdict;
use aggmcp_features::{Analytics, CostTracker, ResultCache, SecuritySandbox};
use aggmcp_pool::pool::{extract_arguments, require_tool_name};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::{stream, Stream};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::router::{RequestContext, SessionRouter};
use crate::sse::SharedSseClients;

#[derive(Clone)]
struct AppState {
    router: Arc<SessionRouter>,
    sse_clients: SharedSseClients,
    event_bus: Arc<BroadcastEventBus>,
    security: Arc<SecuritySandbox>,
    analytics: Arc<Analytics>,
    cost: Arc<CostTracker>,
    cache: Arc<ResultCache>,
    config: Arc<AppConfig>,
    host: String,
    port: u16,
}

/// Bind and serve the HTTP/SSE surface, retrying on the next port up to
/// ten times if the configured one is already taken. Logs the exact
/// `running on http://<host>:<port>` line once bound.
///
/// # Errors
///
/// Returns an error if no port in the retry range can be bound, or if
/// the server loop itself fails.
#[allow(clippy::too_many_arguments)]
pub async fn serve(
    config: Arc<AppConfig>,
    router: Arc<SessionRouter>,
    sse_clients: SharedSseClients,
    event_bus: Arc<BroadcastEventBus>,
    security: Arc<SecuritySandbox>,
    analytics: Arc<Analytics>,
    cost: Arc<CostTracker>,
    cache: Arc<ResultCache>,
) -> Result<()> {
    const MAX_PORT_ATTEMPTS: u16 = 10;

    let mut port = config.server.port;
    let listener = loop {
        let addr = format!("{}:{port}", config.server.host);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => break listener,
            Err(source) if source.kind() == std::io::ErrorKind::AddrInUse && port != 0 => {
                tracing::debug!(port, "port in use, retrying with the next one");
                if port - config.server.port >= MAX_PORT_ATTEMPTS {
                    return Err(Error::internal(format!("no free port found near {}", config.server.port)));
                }
                port += 1;
            }
            Err(source) => return Err(Error::Io { source }),
        }
    };

    let local_addr = listener.local_addr().map_err(|source| Error::Io { source })?;
    let app = self::app(
        router,
        sse_clients,
        event_bus,
        security,
        analytics,
        cost,
        cache,
        config,
        local_addr.ip().to_string(),
        local_addr.port(),
    );

    tracing::info!("running on http://{}:{}", local_addr.ip(), local_addr.port());

    axum::serve(listener, app).await.map_err(|source| Error::Io { source })
}

/// Build the full Axum [`Router`] over the given side-channel services,
/// without binding a socket. Used by [`serve`] and, directly, by
/// integration tests that drive the app with `tower::ServiceExt::oneshot`.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn app(
    router: Arc<SessionRouter>,
    sse_clients: SharedSseClients,
    event_bus: Arc<BroadcastEventBus>,
    security: Arc<SecuritySandbox>,
    analytics: Arc<Analytics>,
    cost: Arc<CostTracker>,
    cache: Arc<ResultCache>,
    config: Arc<AppConfig>,
    host: String,
    port: u16,
) -> Router {
    build_router(AppState {
        router,
        sse_clients,
        event_bus,
        security,
        analytics,
        cost,
        cache,
        config,
        host,
        port,
    })
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(post_root))
        .route("/events", get(get_events))
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .route("/analytics", get(get_analytics))
        .route("/usage", get(get_usage))
        .route("/cache", get(get_cache))
        .route("/security", get(get_security))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned).filter(|s| !s.is_empty())
}

fn request_context(headers: &HeaderMap) -> std::result::Result<RequestContext, String> {
    let workspace_id = header_str(headers, "x-workspace-id").ok_or("missing required header 'X-Workspace-ID'")?;
    let workspace_path = header_str(headers, "x-workspace-path").ok_or("missing required header 'X-Workspace-Path'")?;
    Ok(RequestContext {
        workspace_id,
        workspace_path,
        model_id: header_str(headers, "x-model-id"),
        session_id: header_str(headers, "x-session-id"),
    })
}

async fn post_root(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            let error = JsonRpcError::new(JsonRpcError::PARSE_ERROR, "request body is not valid JSON");
            return Json(JsonRpcMessage::encode_response_err(Value::Null, error));
        }
    };

    let Some(message) = JsonRpcMessage::from_value(value) else {
        let error = JsonRpcError::new(JsonRpcError::PARSE_ERROR, "request body is not a JSON-RPC request");
        return Json(JsonRpcMessage::encode_response_err(Value::Null, error));
    };

    let (id, method, params) = match message {
        JsonRpcMessage::Request { id, method, params } => (id, method, params),
        // A bare notification has no id to reply to; there's nothing
        // meaningful to send back over a request/response transport.
        JsonRpcMessage::Notification { .. } | JsonRpcMessage::Response { .. } => return Json(Value::Null),
    };

    let ctx = match request_context(&headers) {
        Ok(ctx) => ctx,
        Err(message) => {
            let error = JsonRpcError::new(JsonRpcError::INVALID_PARAMS, message);
            return Json(JsonRpcMessage::encode_response_err(id, error));
        }
    };

    let tool_call = (method == "tools/call").then(|| require_tool_name(&params).ok().map(|name| (name, extract_arguments(&params)))).flatten();

    if let Some((name, arguments)) = &tool_call {
        let original = split_namespaced(name).map_or(name.as_str(), |(_, original)| original);
        if let Verdict::Blocked { message, .. } = state.security.validate(original, arguments) {
            let error = JsonRpcError::new(JsonRpcError::SECURITY_BLOCKED, message);
            return Json(JsonRpcMessage::encode_response_err(id, error));
        }
    }

    let started = Instant::now();
    let outcome = state.router.dispatch(&method, params, &ctx).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    if let Some((name, arguments)) = &tool_call {
        record_tool_call_telemetry(&state, &ctx, name, arguments, &outcome, latency_ms);
    }

    Json(match outcome {
        Ok(result) => JsonRpcMessage::encode_response_ok(id, result),
        Err(error) => JsonRpcMessage::encode_response_err(id, error),
    })
}

fn record_tool_call_telemetry(
    state: &AppState,
    ctx: &RequestContext,
    name: &str,
    arguments: &Value,
    outcome: &std::result::Result<Value, JsonRpcError>,
    latency_ms: f64,
) {
    let is_error = match outcome {
        Err(_) => true,
        Ok(result) => result.get("isError").and_then(Value::as_bool) == Some(true),
    };
    state.analytics.record_call(name, &ctx.workspace_id, Some(latency_ms), is_error);

    let original = split_namespaced(name).map_or(name, |(_, original)| original);
    let argument_chars = arguments.to_string().len();
    let result_chars = outcome.as_ref().map(|result| result.to_string().len()).unwrap_or(0);
    let (input_tokens, output_tokens) = estimate_tokens(original, argument_chars, result_chars);
    state.cost.record(name, &ctx.workspace_id, input_tokens, output_tokens);
}

struct SseGuard {
    clients: SharedSseClients,
    id: u64,
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        self.clients.disconnect(self.id);
    }
}

/// `config_change` is the one SSE event name surfaced to clients; both
/// backend-definition and profile-document changes collapse into it —
/// the reason field tells them which, if they care. Backend status
/// transitions are an internal signal the Pool already reacts to on its
/// own and are not re-emitted here.
async fn get_events(State(state): State<AppState>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let client_id = state.sse_clients.connect();
    let rx = state.event_bus.subscribe();
    let guard = SseGuard { clients: Arc::clone(&state.sse_clients), id: client_id };

    let connected = stream::once(async move {
        Ok(Event::default().event("connected").json_data(json!({ "clientId": client_id })).expect("sse payload is serializable"))
    });

    let forwarded = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        loop {
            match rx.recv().await {
                Ok(DomainEvent::BackendConfigChanged { at }) => {
                    let event = Event::default().event("config_change").json_data(json!({ "reason": "backends", "at": at })).expect("sse payload is serializable");
                    return Some((Ok(event), (rx, guard)));
                }
                Ok(DomainEvent::ProfilesChanged { at }) => {
                    let event = Event::default().event("config_change").json_data(json!({ "reason": "profiles", "at": at })).expect("sse payload is serializable");
                    return Some((Ok(event), (rx, guard)));
                }
                Ok(DomainEvent::BackendStatusChanged { .. }) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(connected.chain(forwarded)).keep_alive(KeepAlive::default())
}

async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn get_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "running": true,
        "host": state.host,
        "port": state.port,
        "sseClients": state.sse_clients.count(),
        "backendsFile": state.config.paths.backends_file,
        "profilesFile": state.config.paths.profiles_file,
        "sessions": state.router.active_sessions(),
    }))
}

async fn get_analytics(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.analytics.all_tools() }))
}

async fn get_usage(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "today": state.cost.today_usage(),
        "total": state.cost.total_usage(),
    }))
}

async fn get_cache(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.cache.stats()))
}

async fn get_security(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "enabled": state.security.is_enabled(),
        "violations": state.security.violations(),
    }))
}
