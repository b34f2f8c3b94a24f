//! The Backend Pool: owns every backend's lifecycle, speaks the MCP
//! handshake, aggregates and namespaces capability lists, and dispatches
//! namespaced tool calls and resource reads (spec §4.1).

use std::sync::Arc;
use std::time::Duration;

use aggmcp_domain::backend::{join_namespaced, split_namespaced, BackendDefinition, BackendStatus, LaunchDescriptor};
use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::mcp::{server_capabilities, tool_error_result, PROTOCOL_VERSION};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::remote::RemoteChannel;
use crate::stdio::StdioChannel;

/// Name the core identifies itself with during the MCP handshake (spec
/// §6: "Server info identifies the core by name and version").
pub const CLIENT_NAME: &str = "aggmcp";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

enum BackendChannel {
    Stdio(StdioChannel),
    Remote(RemoteChannel),
}

impl BackendChannel {
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        match self {
            Self::Stdio(c) => c.call(method, params, timeout).await,
            Self::Remote(c) => c.call(method, params, timeout).await,
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        match self {
            Self::Stdio(c) => c.notify(method, params),
            Self::Remote(c) => c.notify(method, params).await,
        }
    }

    fn shutdown(&self) {
        if let Self::Stdio(c) = self {
            c.shutdown();
        }
    }
}

/// Runtime state for one backend, exclusively owned by the Pool (spec §3:
/// "Backend Instance").
struct BackendInstance {
    status: BackendStatus,
    last_error: Option<String>,
    tools: Vec<Value>,
    resources: Vec<Value>,
    prompts: Vec<Value>,
    channel: Option<BackendChannel>,
}

impl BackendInstance {
    fn disconnected() -> Self {
        Self {
            status: BackendStatus::Disconnected,
            last_error: None,
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            channel: None,
        }
    }
}

/// A point-in-time snapshot of one backend's status, for diagnostic
/// surfaces (`/status`, `server_status()`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendStatusSnapshot {
    pub id: String,
    pub status: BackendStatus,
    pub last_error: Option<String>,
    pub tool_count: usize,
    pub resource_count: usize,
    pub prompt_count: usize,
}

/// Owns subprocess/remote-channel lifecycles for every defined backend.
pub struct BackendPool {
    definitions: DashMap<String, BackendDefinition>,
    instances: DashMap<String, Arc<RwLock<BackendInstance>>>,
    request_timeout: Duration,
    startup_grace: Duration,
}

impl BackendPool {
    #[must_use]
    pub fn new(request_timeout: Duration, startup_grace: Duration) -> Self {
        Self {
            definitions: DashMap::new(),
            instances: DashMap::new(),
            request_timeout,
            startup_grace,
        }
    }

    /// Replace the in-memory backend definitions wholesale — the
    /// "read entire new contents into a fresh structure, swap" rule from
    /// spec §5. Already-connected instances for ids that still exist are
    /// left untouched; instances for ids removed from the new set are
    /// disconnected.
    pub fn set_definitions(&self, defs: Vec<BackendDefinition>) {
        let new_ids: std::collections::HashSet<_> = defs.iter().map(|d| d.id.clone()).collect();
        self.definitions.clear();
        for def in defs {
            self.definitions.insert(def.id.clone(), def);
        }
        let stale: Vec<String> = self
            .instances
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| !new_ids.contains(id))
            .collect();
        for id in stale {
            self.disconnect_sync(&id);
        }
    }

    #[must_use]
    pub fn known_backend_ids(&self) -> Vec<String> {
        self.definitions.iter().map(|e| e.key().clone()).collect()
    }

    fn disconnect_sync(&self, id: &str) {
        if let Some((_, instance)) = self.instances.remove(id) {
            if let Ok(guard) = instance.try_read() {
                if let Some(channel) = &guard.channel {
                    channel.shutdown();
                }
            }
        }
    }

    /// Connect to a single backend: spawn/dial, handshake, populate
    /// capability caches. Marks the instance `connected` only once
    /// `initialize` succeeds (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnknown`] if `id` has no definition,
    /// [`Error::BackendSpawn`] if the transport cannot be established, or
    /// [`Error::BackendHandshake`] if the MCP handshake fails.
    pub async fn connect(&self, id: &str) -> Result<()> {
        let definition = self
            .definitions
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::BackendUnknown { id: id.to_owned() })?;

        let slot = Arc::clone(
            self.instances
                .entry(id.to_owned())
                .or_insert_with(|| Arc::new(RwLock::new(BackendInstance::disconnected())))
                .value(),
        );

        {
            let mut guard = slot.write().await;
            guard.status = BackendStatus::Connecting;
        }

        let (channel, exit_rx) = match self.spawn_channel(&definition) {
            Ok(pair) => pair,
            Err(err) => {
                let mut guard = slot.write().await;
                guard.status = BackendStatus::Error;
                guard.last_error = Some(err.to_string());
                return Err(err);
            }
        };

        if matches!(&channel, BackendChannel::Stdio(_)) && !self.startup_grace.is_zero() {
            tokio::time::sleep(self.startup_grace).await;
        }

        match self.handshake(id, &channel).await {
            Ok((tools, resources, prompts)) => {
                let mut guard = slot.write().await;
                guard.status = BackendStatus::Connected;
                guard.last_error = None;
                guard.tools = tools;
                guard.resources = resources;
                guard.prompts = prompts;
                guard.channel = Some(channel);
                drop(guard);
                if let Some(exit_rx) = exit_rx {
                    self.watch_for_exit(id.to_owned(), Arc::clone(&slot), exit_rx);
                }
                Ok(())
            }
            Err(err) => {
                channel.shutdown();
                let mut guard = slot.write().await;
                guard.status = BackendStatus::Error;
                guard.last_error = Some(err.to_string());
                Err(Error::BackendHandshake {
                    id: id.to_owned(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn spawn_channel(&self, definition: &BackendDefinition) -> Result<(BackendChannel, Option<tokio::sync::oneshot::Receiver<String>>)> {
        match &definition.launch {
            LaunchDescriptor::Stdio { command, args, env } => {
                let (channel, exit_rx) = StdioChannel::spawn(&definition.id, command, args, env)?;
                Ok((BackendChannel::Stdio(channel), Some(exit_rx)))
            }
            LaunchDescriptor::Remote { url, transport: _ } => {
                Ok((BackendChannel::Remote(RemoteChannel::new(&definition.id, url)?), None))
            }
        }
    }

    /// Watch a stdio backend's exit signal and flip its instance back to
    /// `disconnected` the moment the subprocess goes away, per the §4.1
    /// state machine's `connected --exit--> disconnected` transition
    /// (left unhandled by the reference source, per §9).
    fn watch_for_exit(&self, id: String, slot: Arc<RwLock<BackendInstance>>, exit_rx: tokio::sync::oneshot::Receiver<String>) {
        tokio::spawn(async move {
            let reason = exit_rx.await.unwrap_or_else(|_| "actor task ended".to_owned());
            let mut guard = slot.write().await;
            if guard.status == BackendStatus::Connected {
                guard.status = BackendStatus::Disconnected;
                guard.last_error = Some(reason);
                guard.channel = None;
                tracing::warn!(backend = %id, "backend disconnected");
            }
        });
    }

    async fn handshake(&self, id: &str, channel: &BackendChannel) -> Result<(Vec<Value>, Vec<Value>, Vec<Value>)> {
        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
        });
        channel.call("initialize", init_params, self.request_timeout).await?;
        channel.notify("notifications/initialized", Value::Null).await?;

        let tools = channel
            .call("tools/list", json!({}), self.request_timeout)
            .await
            .map(|v| extract_array(&v, "tools"))
            .unwrap_or_default();
        let resources = channel
            .call("resources/list", json!({}), self.request_timeout)
            .await
            .map(|v| extract_array(&v, "resources"))
            .unwrap_or_default();
        let prompts = channel
            .call("prompts/list", json!({}), self.request_timeout)
            .await
            .map(|v| extract_array(&v, "prompts"))
            .unwrap_or_default();

        tracing::debug!(backend = %id, tools = tools.len(), resources = resources.len(), prompts = prompts.len(), "backend capabilities cached");
        Ok((tools, resources, prompts))
    }

    pub async fn disconnect(&self, id: &str) {
        self.disconnect_sync(id);
    }

    /// Connect to every listed id, opportunistically. A single backend's
    /// failure never fails the whole call (spec §4.4: session creation is
    /// fail-soft).
    pub async fn connect_all(&self, ids: &[String]) {
        for id in ids {
            if self.is_connected(id).await {
                continue;
            }
            if let Err(err) = self.connect(id).await {
                tracing::warn!(backend = %id, error = %err, "backend failed to connect");
            }
        }
    }

    async fn is_connected(&self, id: &str) -> bool {
        match self.instances.get(id) {
            Some(instance) => instance.read().await.status == BackendStatus::Connected,
            None => false,
        }
    }

    /// Aggregated, namespaced tools from every connected backend in
    /// `ids`. Disconnected/errored backends contribute nothing.
    pub async fn get_tools(&self, ids: &[String]) -> Vec<Value> {
        self.namespaced_capability(ids, "name", |i| &i.tools).await
    }

    /// Aggregated, namespaced resources (URI rewritten instead of `name`).
    pub async fn get_resources(&self, ids: &[String]) -> Vec<Value> {
        self.namespaced_capability(ids, "uri", |i| &i.resources).await
    }

    /// Aggregated, namespaced prompts.
    pub async fn get_prompts(&self, ids: &[String]) -> Vec<Value> {
        self.namespaced_capability(ids, "name", |i| &i.prompts).await
    }

    async fn namespaced_capability(
        &self,
        ids: &[String],
        key_field: &str,
        select: impl Fn(&BackendInstance) -> &Vec<Value>,
    ) -> Vec<Value> {
        let mut out = Vec::new();
        for id in ids {
            let Some(instance) = self.instances.get(id) else { continue };
            let guard = instance.read().await;
            if guard.status != BackendStatus::Connected {
                continue;
            }
            for item in select(&guard) {
                let mut rewritten = item.clone();
                if let Some(obj) = rewritten.as_object_mut() {
                    if let Some(original) = obj.get(key_field).and_then(Value::as_str) {
                        let namespaced = join_namespaced(id, original);
                        obj.insert(key_field.to_owned(), Value::String(namespaced));
                    }
                }
                out.push(rewritten);
            }
        }
        out
    }

    /// Dispatch a namespaced `tools/call`. Per spec §4.1: a missing `::`
    /// separator or a not-connected backend is returned as an MCP
    /// error-shaped *result*, not a transport failure.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for genuine backend transport/timeout failures;
    /// application-level tool errors are returned as `Ok` with
    /// `isError: true`, matching the MCP result shape.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let Some((backend_id, original_name)) = split_namespaced(name) else {
            return Ok(tool_error_result(format!(
                "malformed tool name '{name}': missing '::' namespace separator"
            )));
        };

        let Some(instance) = self.instances.get(backend_id) else {
            return Ok(tool_error_result(format!("backend '{backend_id}' is not connected")));
        };

        let channel = {
            let guard = instance.read().await;
            if guard.status != BackendStatus::Connected {
                return Ok(tool_error_result(format!("backend '{backend_id}' is not connected")));
            }
            // `channel` is only ever None while status != Connected, so this
            // clone-free reference use is safe under the same read guard.
            match &guard.channel {
                Some(BackendChannel::Stdio(c)) => BackendChannel::Stdio(c.clone()),
                Some(BackendChannel::Remote(c)) => BackendChannel::Remote(c.clone()),
                None => return Ok(tool_error_result(format!("backend '{backend_id}' is not connected"))),
            }
        };

        let params = json!({ "name": original_name, "arguments": arguments });
        match channel.call("tools/call", params, self.request_timeout).await {
            Ok(result) => Ok(result),
            Err(Error::BackendCall { message, .. }) => Ok(tool_error_result(message)),
            Err(other) => Err(other),
        }
    }

    /// Read a namespaced resource. Unlike `call_tool`, failures propagate
    /// as `Err` — the `resources/read` result shape has no `isError`
    /// sentinel (spec §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedNamespacedId`] if `uri` has no `::`
    /// separator, [`Error::BackendNotConnected`] if the backend isn't
    /// connected, or the backend's own transport/call error.
    pub async fn read_resource(&self, uri: &str) -> Result<Value> {
        let (backend_id, original_uri) =
            split_namespaced(uri).ok_or_else(|| Error::MalformedNamespacedId { value: uri.to_owned() })?;

        let instance = self
            .instances
            .get(backend_id)
            .ok_or_else(|| Error::BackendNotConnected { id: backend_id.to_owned() })?;

        let channel = {
            let guard = instance.read().await;
            if guard.status != BackendStatus::Connected {
                return Err(Error::BackendNotConnected { id: backend_id.to_owned() });
            }
            match &guard.channel {
                Some(BackendChannel::Stdio(c)) => BackendChannel::Stdio(c.clone()),
                Some(BackendChannel::Remote(c)) => BackendChannel::Remote(c.clone()),
                None => return Err(Error::BackendNotConnected { id: backend_id.to_owned() }),
            }
        };

        channel
            .call("resources/read", json!({ "uri": original_uri }), self.request_timeout)
            .await
    }

    /// Forward a `prompts/get` to the backend that owns `original_name`,
    /// per the Router's single-owner policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotConnected`] if `backend_id` is not
    /// connected, or the backend's own transport/call error.
    pub async fn get_prompt(&self, backend_id: &str, original_name: &str) -> Result<Value> {
        let instance = self
            .instances
            .get(backend_id)
            .ok_or_else(|| Error::BackendNotConnected { id: backend_id.to_owned() })?;

        let channel = {
            let guard = instance.read().await;
            if guard.status != BackendStatus::Connected {
                return Err(Error::BackendNotConnected { id: backend_id.to_owned() });
            }
            match &guard.channel {
                Some(BackendChannel::Stdio(c)) => BackendChannel::Stdio(c.clone()),
                Some(BackendChannel::Remote(c)) => BackendChannel::Remote(c.clone()),
                None => return Err(Error::BackendNotConnected { id: backend_id.to_owned() }),
            }
        };

        channel.call("prompts/get", json!({ "name": original_name }), self.request_timeout).await
    }

    /// Snapshot every known backend's current status, for `/status`.
    pub async fn server_status(&self) -> Vec<BackendStatusSnapshot> {
        let mut out = Vec::new();
        for id in self.known_backend_ids() {
            let snapshot = match self.instances.get(&id) {
                Some(instance) => {
                    let guard = instance.read().await;
                    BackendStatusSnapshot {
                        id: id.clone(),
                        status: guard.status,
                        last_error: guard.last_error.clone(),
                        tool_count: guard.tools.len(),
                        resource_count: guard.resources.len(),
                        prompt_count: guard.prompts.len(),
                    }
                }
                None => BackendStatusSnapshot {
                    id: id.clone(),
                    status: BackendStatus::Disconnected,
                    last_error: None,
                    tool_count: 0,
                    resource_count: 0,
                    prompt_count: 0,
                },
            };
            out.push(snapshot);
        }
        out
    }

    /// Kill every live backend and drop all instances. Called on process
    /// shutdown.
    pub async fn dispose(&self) {
        let ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.disconnect_sync(&id);
        }
    }
}

/// Extract the named array field from a `*/list` result, tolerating a
/// backend that omits the field entirely (treated as empty, not an
/// error — a backend with no tools is not malformed).
fn extract_array(value: &Value, field: &str) -> Vec<Value> {
    value
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Required args extraction helper shared with the Router for
/// `tools/call` dispatch (spec §7: "Arguments" error kind).
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `params` has no `name` field.
pub fn require_tool_name(params: &Value) -> Result<String> {
    params
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::invalid_argument("tools/call requires a string 'name' field"))
}

#[must_use]
pub fn extract_arguments(params: &Value) -> Value {
    params.get("arguments").cloned().unwrap_or_else(|| json!({}))
}

#[must_use]
pub fn extract_uri(params: &Value) -> Option<String> {
    params.get("uri").and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_array_defaults_to_empty() {
        let v = json!({ "other": [] });
        assert_eq!(extract_array(&v, "tools"), Vec::<Value>::new());
    }

    #[test]
    fn extract_array_reads_field() {
        let v = json!({ "tools": [{"name": "a"}] });
        assert_eq!(extract_array(&v, "tools").len(), 1);
    }

    #[test]
    fn require_tool_name_rejects_missing_field() {
        assert!(require_tool_name(&json!({})).is_err());
    }

    #[test]
    fn require_tool_name_reads_string_field() {
        assert_eq!(require_tool_name(&json!({"name": "server-git::git_status"})).unwrap(), "server-git::git_status");
    }

    #[tokio::test]
    async fn unconnected_backend_call_is_error_result_not_failure() {
        let pool = BackendPool::new(Duration::from_secs(1), Duration::from_millis(1));
        let result = pool.call_tool("server-git::git_status", json!({})).await.unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[tokio::test]
    async fn missing_separator_is_error_result_not_failure() {
        let pool = BackendPool::new(Duration::from_secs(1), Duration::from_millis(1));
        let result = pool.call_tool("bare_tool_name", json!({})).await.unwrap();
        assert_eq!(result["isError"], json!(true));
    }

    #[tokio::test]
    async fn read_resource_on_unknown_backend_propagates_error() {
        let pool = BackendPool::new(Duration::from_secs(1), Duration::from_millis(1));
        let err = pool.read_resource("server-git::status").await.unwrap_err();
        matches!(err, Error::BackendNotConnected { .. });
    }

    #[tokio::test]
    async fn get_tools_on_unknown_ids_is_empty_not_error() {
        let pool = BackendPool::new(Duration::from_secs(1), Duration::from_millis(1));
        let tools = pool.get_tools(&["nonexistent".to_owned()]).await;
        assert!(tools.is_empty());
    }
}
