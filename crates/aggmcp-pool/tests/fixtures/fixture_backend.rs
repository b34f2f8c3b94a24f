//! A tiny standalone MCP server used only by `subprocess_integration.rs`
//! to exercise `BackendPool` against a real subprocess. Speaks the same
//! newline-delimited JSON-RPC framing as any other backend: `initialize`,
//! `notifications/initialized`, `tools/list` (one `echo` tool), and
//! `tools/call` (echoes its arguments back as the tool result).

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        let Some(method) = request.get("method").and_then(Value::as_str) else {
            continue;
        };
        let id = request.get("id").cloned();

        let Some(id) = id else {
            // Notification: acknowledged by doing nothing.
            continue;
        };

        let response = match method {
            "initialize" => ok(id, initialize_result()),
            "tools/list" => ok(id, json!({ "tools": [echo_tool()] })),
            "resources/list" => ok(id, json!({ "resources": [] })),
            "prompts/list" => ok(id, json!({ "prompts": [] })),
            "tools/call" => ok(id, call_tool(&request)),
            other => err(id, -32601, format!("method not found: {other}")),
        };

        write_line(&mut stdout, &response);
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": { "tools": { "listChanged": true } },
        "serverInfo": { "name": "fixture-mcp-backend", "version": "0.0.0" },
    })
}

fn echo_tool() -> Value {
    json!({
        "name": "echo",
        "description": "Echoes its arguments back unchanged",
        "inputSchema": { "type": "object" },
    })
}

fn call_tool(request: &Value) -> Value {
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    if name != "echo" {
        return json!({
            "content": [{ "type": "text", "text": format!("unknown tool '{name}'") }],
            "isError": true,
        });
    }

    json!({
        "content": [{ "type": "text", "text": arguments.to_string() }],
        "isError": false,
    })
}

fn ok(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn err(id: Value, code: i64, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

fn write_line(stdout: &mut io::Stdout, value: &Value) {
    let mut bytes = serde_json::to_vec(value).unwrap_or_default();
    bytes.push(b'\n');
    let _ = stdout.write_all(&bytes);
    let _ = stdout.flush();
}
