//! Session Router (spec §4.4): binds a workspace to a profile and its
//! enabled backend set, owns the per-workspace Context Injector, and
//! dispatches each MCP method across the Backend Pool, Context Injector
//! and Prompt Library. A background sweep evicts sessions idle past the
//! configured TTL.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aggmcp_context::ContextInjector;
use aggmcp_domain::backend::split_namespaced;
use aggmcp_domain::error::Error;
use aggmcp_domain::mcp::{server_capabilities, JsonRpcError, PROTOCOL_VERSION};
use aggmcp_domain::ports::CapabilityProvider;
use aggmcp_domain::session::WorkspaceSession;
use aggmcp_features::cache::{cache_key, is_cacheable, ResultCache};
use aggmcp_features::PromptLibrary;
use aggmcp_pool::pool::{extract_arguments, extract_uri, require_tool_name, BackendPool, CLIENT_NAME, CLIENT_VERSION};
use aggmcp_profiles::{resolve_profile, ProfileStore};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Request metadata derived from the four `X-*` headers (spec §6).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub workspace_id: String,
    pub workspace_path: String,
    pub model_id: Option<String>,
    pub session_id: Option<String>,
}

struct RouterSession {
    session: WorkspaceSession,
    context: ContextInjector,
}

/// Point-in-time summary of one session, for `/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub workspace_id: String,
    pub workspace_path: String,
    pub profile_name: String,
    pub enabled_backends: Vec<String>,
    pub idle_secs: u64,
}

pub struct SessionRouter {
    pool: Arc<BackendPool>,
    profiles: Arc<ProfileStore>,
    prompts: Arc<PromptLibrary>,
    cache: Arc<ResultCache>,
    cache_enabled: bool,
    sessions: DashMap<String, Arc<Mutex<RouterSession>>>,
    idle_ttl: Duration,
}

impl SessionRouter {
    #[must_use]
    pub fn new(
        pool: Arc<BackendPool>,
        profiles: Arc<ProfileStore>,
        prompts: Arc<PromptLibrary>,
        cache: Arc<ResultCache>,
        cache_enabled: bool,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            profiles,
            prompts,
            cache,
            cache_enabled,
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    /// Look up the session bound to `ctx.workspace_id`, creating and
    /// binding one if this is the first request from that workspace.
    /// Creation is fail-soft: a backend that fails to connect does not
    /// fail session creation (spec §4.4).
    async fn session_for(&self, ctx: &RequestContext) -> Arc<Mutex<RouterSession>> {
        if let Some(existing) = self.sessions.get(&ctx.workspace_id) {
            return Arc::clone(existing.value());
        }

        let document = self.profiles.document();
        let profile = resolve_profile(&document, Path::new(&ctx.workspace_path)).clone();
        self.pool.connect_all(&profile.backend_ids).await;

        let context = ContextInjector::new(ctx.workspace_id.clone(), ctx.workspace_path.clone());
        let session = WorkspaceSession {
            workspace_id: ctx.workspace_id.clone(),
            workspace_path: ctx.workspace_path.clone(),
            profile_name: profile.name.clone(),
            enabled_backends: profile.backend_ids.clone(),
            last_activity: Instant::now(),
        };

        let entry = Arc::new(Mutex::new(RouterSession { session, context }));
        // A concurrent first request for the same workspace may race this
        // insert; the loser's Arc is simply dropped and both observe the
        // same eventual state, which is acceptable for fail-soft creation.
        self.sessions.insert(ctx.workspace_id.clone(), Arc::clone(&entry));
        entry
    }

    /// Re-resolve an existing session's profile against its stored path
    /// and reconnect its (possibly changed) backend set. A no-op if no
    /// session with `workspace_id` exists.
    pub async fn refresh(&self, workspace_id: &str) {
        let Some(entry) = self.sessions.get(workspace_id).map(|e| Arc::clone(e.value())) else {
            return;
        };
        let mut guard = entry.lock().await;
        let document = self.profiles.document();
        let profile = resolve_profile(&document, Path::new(&guard.session.workspace_path)).clone();
        self.pool.connect_all(&profile.backend_ids).await;
        guard.session.profile_name = profile.name.clone();
        guard.session.enabled_backends = profile.backend_ids.clone();
        guard.session.touch();
    }

    /// Snapshot every live session for `/status`. Sessions whose lock is
    /// currently held by an in-flight request are skipped rather than
    /// awaited, so this never blocks the diagnostic endpoint.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().try_lock().ok()?;
                Some(SessionSummary {
                    workspace_id: guard.session.workspace_id.clone(),
                    workspace_path: guard.session.workspace_path.clone(),
                    profile_name: guard.session.profile_name.clone(),
                    enabled_backends: guard.session.enabled_backends.clone(),
                    idle_secs: guard.session.last_activity.elapsed().as_secs(),
                })
            })
            .collect()
    }

    /// Evict every session idle past the configured TTL (spec §4.4: "a
    /// background sweep every minute").
    pub async fn sweep_idle(&self) {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().try_lock().ok()?;
                guard.session.is_idle(self.idle_ttl).then(|| entry.key().clone())
            })
            .collect();
        for id in idle {
            tracing::debug!(workspace_id = %id, "evicting idle session");
            self.sessions.remove(&id);
        }
    }

    /// Run [`Self::sweep_idle`] on a fixed interval until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.sweep_idle().await;
        }
    }

    /// Dispatch one MCP method, returning the `result` payload or the
    /// [`JsonRpcError`] to wrap in a response envelope. Unknown methods
    /// return `-32601` (spec §4.4).
    pub async fn dispatch(&self, method: &str, params: Value, ctx: &RequestContext) -> Result<Value, JsonRpcError> {
        if method == "initialize" {
            return Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": server_capabilities(),
                "serverInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
            }));
        }

        let entry = self.session_for(ctx).await;

        // `tools/call` may block for up to the backend request timeout
        // (spec §5: 30 s). The session lock is released before that wait
        // starts so a concurrent `tools/list` on the same session is never
        // serialized behind an in-flight call (spec §5: "never hold a lock
        // across a backend send/receive").
        if method == "tools/call" {
            entry.lock().await.session.touch();
            return self.call_tool(params).await;
        }

        let mut guard = entry.lock().await;
        guard.session.touch();
        let enabled_backends = guard.session.enabled_backends.clone();

        match method {
            "tools/list" => Ok(json!({ "tools": self.pool.get_tools(&enabled_backends).await })),
            "resources/list" => {
                let mut resources = guard.context.list_resources().await.map_err(to_jsonrpc_error)?;
                resources.extend(self.pool.get_resources(&enabled_backends).await);
                Ok(json!({ "resources": resources }))
            }
            "resources/read" => {
                let uri = extract_uri(&params)
                    .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "resources/read requires a string 'uri' field"))?;
                if uri.starts_with(aggmcp_context::SCHEME_PREFIX) {
                    guard.context.read_resource(&uri).await.map_err(to_jsonrpc_error)
                } else {
                    self.pool.read_resource(&uri).await.map_err(to_jsonrpc_error)
                }
            }
            "prompts/list" => {
                let project_type = guard.context.project_type().await;
                let mut prompts = self.prompts.list(project_type);
                prompts.extend(self.pool.get_prompts(&enabled_backends).await);
                Ok(json!({ "prompts": prompts }))
            }
            "prompts/get" => self.get_prompt(params, &guard, &enabled_backends).await,
            other => Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("unknown method '{other}'"))),
        }
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let name = require_tool_name(&params).map_err(to_jsonrpc_error)?;
        let arguments = extract_arguments(&params);
        let cacheable = self.cache_enabled
            && split_namespaced(&name).is_some_and(|(_, original)| is_cacheable(original));

        if cacheable {
            let key = cache_key(&name, &arguments);
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit);
            }
        }

        let result = self.pool.call_tool(&name, arguments.clone()).await.map_err(to_jsonrpc_error)?;

        if cacheable && result.get("isError").and_then(Value::as_bool) != Some(true) {
            self.cache.put(cache_key(&name, &arguments), result.clone());
        }
        Ok(result)
    }

    async fn get_prompt(
        &self,
        params: Value,
        guard: &RouterSession,
        enabled_backends: &[String],
    ) -> Result<Value, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::new(JsonRpcError::INVALID_PARAMS, "prompts/get requires a string 'name' field"))?;

        let project_type = guard.context.project_type().await;
        if self.prompts.has(name, project_type) {
            return Ok(self.prompts.get(name, project_type));
        }

        let prompts = self.pool.get_prompts(enabled_backends).await;
        let matches = prompts.iter().filter(|p| p.get("name").and_then(Value::as_str) == Some(name)).count();
        if matches != 1 {
            return Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("ambiguous or unknown prompt '{name}'")));
        }
        let Some((backend_id, original_name)) = split_namespaced(name) else {
            return Err(JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("ambiguous or unknown prompt '{name}'")));
        };
        self.pool.get_prompt(backend_id, original_name).await.map_err(to_jsonrpc_error)
    }
}

fn to_jsonrpc_error(err: Error) -> JsonRpcError {
    JsonRpcError::new(err.jsonrpc_code(), err.to_string())
}
