//! The stdio backend actor: one task owns the child process's stdin, the
//! stdout reader loop, and the pending-request table, exactly as spec §9
//! describes ("Backend instance as an actor"). Callers never touch the
//! pending table directly — they submit work over an mpsc channel and
//! await a oneshot reply.

use std::collections::HashMap;
use std::process::Stdio as StdStdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aggmcp_domain::error::{Error, Result};
use aggmcp_domain::mcp::{JsonRpcError, JsonRpcMessage};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::framing::LineFramer;

enum ActorCommand {
    Call {
        request_id: u64,
        method: String,
        params: Value,
        respond: oneshot::Sender<std::result::Result<Value, JsonRpcError>>,
    },
    Notify {
        method: String,
        params: Value,
    },
    CancelPending {
        request_id: u64,
    },
    Shutdown,
}

/// Handle to a running stdio backend actor. Cloning shares the same
/// underlying process and command channel.
#[derive(Clone)]
pub struct StdioChannel {
    id: String,
    command_tx: mpsc::UnboundedSender<ActorCommand>,
    next_id: Arc<AtomicU64>,
}

impl StdioChannel {
    /// Spawn `command args...` with `env` layered over the inherited
    /// process environment, and start its actor task.
    ///
    /// Returns the channel handle plus a one-shot that resolves with a
    /// reason string the moment the actor loop ends (stdout closed or
    /// explicit shutdown) — callers use it to flip the owning instance's
    /// status back to `disconnected` per the §4.1 state machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendSpawn`] if the OS refuses to spawn the
    /// subprocess (missing binary, permission denied, …).
    pub fn spawn(
        id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<(Self, oneshot::Receiver<String>)> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::BackendSpawn {
            id: id.to_owned(),
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(stderr_logger(id.to_owned(), stderr));
        tokio::spawn(run_actor(id.to_owned(), child, stdin, stdout, command_rx, exit_tx));

        Ok((
            Self {
                id: id.to_owned(),
                command_tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            exit_rx,
        ))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send a request and wait for a matching response, a backend-signaled
    /// error, or the 30-second deadline, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendTimeout`] on deadline, [`Error::BackendNotConnected`]
    /// if the actor has already shut down, or [`Error::BackendCall`] when the
    /// backend itself returned a JSON-RPC error.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let request_id = self.allocate_request_id();
        let (respond, rx) = oneshot::channel();
        self.command_tx
            .send(ActorCommand::Call {
                request_id,
                method: method.to_owned(),
                params,
                respond,
            })
            .map_err(|_| Error::BackendNotConnected { id: self.id.clone() })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(rpc_err))) => Err(Error::BackendCall {
                id: self.id.clone(),
                message: rpc_err.message,
            }),
            Ok(Err(_)) => Err(Error::BackendNotConnected { id: self.id.clone() }),
            Err(_) => {
                // Deadline hit: the waiter is gone, but the actor's pending
                // table still holds it until told otherwise (spec §8:
                // "At quiescence... every backend's pending-request table is
                // empty"). The subprocess itself is left running.
                let _ = self.command_tx.send(ActorCommand::CancelPending { request_id });
                Err(Error::BackendTimeout {
                    id: self.id.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Fire-and-forget a notification (used for `notifications/initialized`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotConnected`] if the actor has shut down.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.command_tx
            .send(ActorCommand::Notify {
                method: method.to_owned(),
                params,
            })
            .map_err(|_| Error::BackendNotConnected { id: self.id.clone() })
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ActorCommand::Shutdown);
    }

    #[must_use]
    pub fn allocate_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

async fn stderr_logger(id: String, mut stderr: tokio::process::ChildStderr) {
    let mut buf = vec![0_u8; 4096];
    let mut framer = LineFramer::new();
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for line in framer.feed(&String::from_utf8_lossy(&buf[..n])) {
                    tracing::debug!(backend = %id, "{line}");
                }
            }
        }
    }
}

async fn run_actor(
    id: String,
    mut child: Child,
    mut stdin: tokio::process::ChildStdin,
    mut stdout: tokio::process::ChildStdout,
    mut command_rx: mpsc::UnboundedReceiver<ActorCommand>,
    exit_tx: oneshot::Sender<String>,
) {
    let mut framer = LineFramer::new();
    let mut read_buf = vec![0_u8; 8192];
    let mut pending: HashMap<u64, oneshot::Sender<std::result::Result<Value, JsonRpcError>>> = HashMap::new();

    let exit_reason = loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ActorCommand::Call { request_id, method, params, respond }) => {
                        let envelope = JsonRpcMessage::encode_request(Value::from(request_id), &method, params);
                        if write_line(&mut stdin, &envelope).await.is_err() {
                            let _ = respond.send(Err(JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "failed to write to backend stdin")));
                            continue;
                        }
                        pending.insert(request_id, respond);
                    }
                    Some(ActorCommand::Notify { method, params }) => {
                        let envelope = JsonRpcMessage::encode_notification(&method, params);
                        let _ = write_line(&mut stdin, &envelope).await;
                    }
                    Some(ActorCommand::CancelPending { request_id }) => {
                        pending.remove(&request_id);
                    }
                    Some(ActorCommand::Shutdown) | None => {
                        drain_pending(&id, &mut pending);
                        let _ = child.start_kill();
                        break "shutdown requested".to_owned();
                    }
                }
            }
            read_result = stdout.read(&mut read_buf) => {
                match read_result {
                    Ok(0) | Err(_) => {
                        tracing::debug!(backend = %id, "backend stdout closed");
                        drain_pending(&id, &mut pending);
                        break "backend process exited".to_owned();
                    }
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&read_buf[..n]);
                        for line in framer.feed(&chunk) {
                            handle_line(&id, &line, &mut pending);
                        }
                    }
                }
            }
        }
    };

    let _ = exit_tx.send(exit_reason);
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, value: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(value).unwrap_or_default();
    bytes.push(b'\n');
    stdin.write_all(&bytes).await?;
    stdin.flush().await
}

fn handle_line(id: &str, line: &str, pending: &mut HashMap<u64, oneshot::Sender<std::result::Result<Value, JsonRpcError>>>) {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        tracing::debug!(backend = %id, line, "dropped malformed line from backend");
        return;
    };

    let Some(message) = JsonRpcMessage::from_value(value) else {
        tracing::debug!(backend = %id, line, "dropped malformed line from backend");
        return;
    };

    let JsonRpcMessage::Response { id: response_id, payload } = message else {
        // Request or notification from the backend. Not currently acted on
        // (spec §9 open question b: listChanged re-emission is an extension point).
        return;
    };

    let Some(response_id) = response_id.as_u64() else {
        return;
    };

    let Some(waiter) = pending.remove(&response_id) else {
        return;
    };

    let _ = waiter.send(payload);
}

fn drain_pending(id: &str, pending: &mut HashMap<u64, oneshot::Sender<std::result::Result<Value, JsonRpcError>>>) {
    for (_, waiter) in pending.drain() {
        let _ = waiter.send(Err(JsonRpcError::new(
            JsonRpcError::INTERNAL_ERROR,
            format!("backend '{id}' disconnected"),
        )));
    }
}
