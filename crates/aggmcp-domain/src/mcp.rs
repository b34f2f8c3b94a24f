//! MCP JSON-RPC envelope types.
//!
//! Per design note §9 ("Polymorphism over call targets"), inbound and
//! outbound MCP traffic is modeled as a tagged variant of
//! `{request | response | notification}` rather than branching on ad hoc
//! object shape at every call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this proxy speaks to backends and advertises
/// to clients.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SECURITY_BLOCKED: i64 = -32000;
}

/// An envelope received from, or sent to, an MCP peer — tagged by which
/// of the three JSON-RPC message shapes it is. `Request` carries `id`;
/// `Notification` never does; `Response` carries either a result or an
/// error.
#[derive(Debug, Clone)]
pub enum JsonRpcMessage {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Response {
        id: Value,
        payload: std::result::Result<Value, JsonRpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl JsonRpcMessage {
    /// Classify a raw decoded JSON value into one of the three message
    /// shapes. Lines that are neither are rejected by the caller as
    /// malformed (spec §4.1: "malformed lines are dropped with a debug
    /// log").
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").cloned();
        let method = obj.get("method").and_then(Value::as_str).map(str::to_owned);

        if let Some(method) = method {
            let params = obj.get("params").cloned().unwrap_or(Value::Null);
            return Some(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            });
        }

        let id = id?;
        if let Some(result) = obj.get("result") {
            return Some(Self::Response {
                id,
                payload: Ok(result.clone()),
            });
        }
        if let Some(error) = obj.get("error") {
            let err: JsonRpcError = serde_json::from_value(error.clone()).ok()?;
            return Some(Self::Response {
                id,
                payload: Err(err),
            });
        }
        None
    }

    /// Encode a request envelope ready to write (plus a trailing newline)
    /// to a backend's stdin.
    #[must_use]
    pub fn encode_request(id: Value, method: &str, params: Value) -> Value {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        })
    }

    /// Encode a notification envelope (no `id`).
    #[must_use]
    pub fn encode_notification(method: &str, params: Value) -> Value {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
        })
    }

    /// Encode a success response envelope.
    #[must_use]
    pub fn encode_response_ok(id: Value, result: Value) -> Value {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "result": result,
        })
    }

    /// Encode an error response envelope.
    #[must_use]
    pub fn encode_response_err(id: Value, error: JsonRpcError) -> Value {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": error,
        })
    }
}

/// Build an MCP `tools/call`-shaped error result: not a JSON-RPC failure,
/// but a successful response whose content signals failure via
/// `isError: true` (spec §4.1: "returns an error result (not a failure)").
#[must_use]
pub fn tool_error_result(message: impl Into<String>) -> Value {
    serde_json::json!({
        "content": [{ "type": "text", "text": message.into() }],
        "isError": true,
    })
}

/// The capability set the core advertises on `initialize` (spec §4.4):
/// `tools.listChanged`, `resources.listChanged` (no `subscribe`),
/// `prompts.listChanged`.
#[must_use]
pub fn server_capabilities() -> Value {
    serde_json::json!({
        "tools": { "listChanged": true },
        "resources": { "listChanged": true, "subscribe": false },
        "prompts": { "listChanged": true },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request() {
        let v = serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}});
        match JsonRpcMessage::from_value(v).unwrap() {
            JsonRpcMessage::Request { id, method, .. } => {
                assert_eq!(id, Value::from(1));
                assert_eq!(method, "tools/list");
            }
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn classifies_notification() {
        let v = serde_json::json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        match JsonRpcMessage::from_value(v).unwrap() {
            JsonRpcMessage::Notification { method, .. } => {
                assert_eq!(method, "notifications/initialized");
            }
            _ => panic!("expected Notification"),
        }
    }

    #[test]
    fn classifies_success_response() {
        let v = serde_json::json!({"jsonrpc":"2.0","id":7,"result":{"ok":true}});
        match JsonRpcMessage::from_value(v).unwrap() {
            JsonRpcMessage::Response { id, payload } => {
                assert_eq!(id, Value::from(7));
                assert!(payload.is_ok());
            }
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn classifies_error_response() {
        let v = serde_json::json!({"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope"}});
        match JsonRpcMessage::from_value(v).unwrap() {
            JsonRpcMessage::Response { payload, .. } => {
                let err = payload.unwrap_err();
                assert_eq!(err.code, -32601);
            }
            _ => panic!("expected Response"),
        }
    }

    #[test]
    fn rejects_malformed_line() {
        let v = serde_json::json!({"foo": "bar"});
        assert!(JsonRpcMessage::from_value(v).is_none());
    }
}
