//! HTTP transport for a remote MCP backend (spec §3: "`url + transport`
//! for a remote HTTP-based backend"). Mirrors [`crate::stdio::StdioChannel`]'s
//! public shape (`call`/`notify`) so [`crate::pool::BackendPool`] can treat
//! both transports uniformly behind one internal enum.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::mcp::JsonRpcMessage;
use serde_json::Value;

/// A channel to a remote MCP server reached over HTTP. Each request is a
/// single POST carrying one JSON-RPC envelope; there is no persistent
/// connection to multiplex over, so "the pending table" for this
/// transport is simply the in-flight HTTP request itself.
#[derive(Clone)]
pub struct RemoteChannel {
    id: String,
    url: String,
    client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl RemoteChannel {
    /// # Errors
    ///
    /// Returns [`Error::BackendSpawn`] if the underlying HTTP client
    /// cannot be built (e.g. TLS backend misconfiguration).
    pub fn new(id: &str, url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::BackendSpawn {
                id: id.to_owned(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            id: id.to_owned(),
            url: url.to_owned(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn allocate_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for the HTTP response body, which must
    /// decode as a JSON-RPC response envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendTimeout`] on deadline, [`Error::BackendTransport`]
    /// on HTTP/decode failure, or [`Error::BackendCall`] when the remote
    /// returned a JSON-RPC error.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let request_id = self.allocate_request_id();
        let envelope = JsonRpcMessage::encode_request(Value::from(request_id), method, params);

        let send = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| Error::BackendTimeout {
                id: self.id.clone(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| Error::BackendTransport {
                id: self.id.clone(),
                message: e.to_string(),
            })?;

        let body: Value = response.json().await.map_err(|e| Error::BackendTransport {
            id: self.id.clone(),
            message: format!("failed to decode response body: {e}"),
        })?;

        match JsonRpcMessage::from_value(body) {
            Some(JsonRpcMessage::Response { payload: Ok(result), .. }) => Ok(result),
            Some(JsonRpcMessage::Response { payload: Err(err), .. }) => Err(Error::BackendCall {
                id: self.id.clone(),
                message: err.message,
            }),
            _ => Err(Error::BackendTransport {
                id: self.id.clone(),
                message: "response was not a JSON-RPC response envelope".to_owned(),
            }),
        }
    }

    /// Fire-and-forget a notification. Remote backends acknowledge with
    /// an empty body; the call itself still awaits the HTTP round trip so
    /// the caller knows the POST reached the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendTransport`] if the POST fails.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let envelope = JsonRpcMessage::encode_notification(method, params);
        self.client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::BackendTransport {
                id: self.id.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
