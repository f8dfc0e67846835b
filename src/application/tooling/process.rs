use super::error::ToolInvokeError;
use super::interface::{ToolDescriptor, ToolTransport};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

/// How to start the tool-host child. The child inherits the parent
/// environment, which is how collaborator credentials reach it.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub command: String,
    pub args: Vec<String>,
}

/// One long-lived tool-host child per session, driven over newline-delimited
/// JSON-RPC on its stdin/stdout. The child is spawned lazily on the first
/// request and is expected to stay up for the session's lifetime.
#[derive(Clone)]
pub struct HostProcess {
    inner: Arc<HostProcessInner>,
}

struct HostProcessInner {
    config: HostConfig,
    state: AsyncMutex<Option<RunningState>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, oneshot::Sender<Result<Value, ToolInvokeError>>>>,
    id_counter: AtomicU64,
}

struct RunningState {
    child: Child,
}

impl HostProcess {
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Arc::new(HostProcessInner {
                config,
                state: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                pending: AsyncMutex::new(HashMap::new()),
                id_counter: AtomicU64::new(1),
            }),
        }
    }
}

#[async_trait]
impl ToolTransport for HostProcess {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolInvokeError> {
        self.inner.ensure_running().await?;
        let result = self.inner.send_request("tools/list", json!({})).await?;
        let listing: ToolListing =
            serde_json::from_value(result).map_err(|source| ToolInvokeError::InvalidJson { source })?;
        Ok(listing.tools)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolInvokeError> {
        self.inner.ensure_running().await?;
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        self.inner.send_request("tools/call", params).await
    }
}

impl HostProcessInner {
    async fn ensure_running(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        {
            let state = self.state.lock().await;
            if state.is_some() {
                return Ok(());
            }
        }

        let mut command = Command::new(&self.config.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if !self.config.args.is_empty() {
            command.args(&self.config.args);
        }

        let mut child = command.spawn().map_err(|source| ToolInvokeError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("failed to capture tool host stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("failed to capture tool host stdout"))?;

        {
            let mut writer = self.writer.lock().await;
            *writer = Some(BufWriter::new(stdin));
        }

        {
            let mut state = self.state.lock().await;
            *state = Some(RunningState { child });
        }

        let reader_self = Arc::clone(self);
        tokio::spawn(async move {
            reader_self.reader_loop(stdout).await;
        });

        debug!(command = %self.config.command, "Tool host process started");
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(item) = lines.next_line().await {
            match item {
                Some(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => self.handle_response(value).await,
                        Err(source) => {
                            warn!(line = raw, %source, "received invalid JSON from tool host");
                        }
                    }
                }
                None => break,
            }
        }

        self.reset().await;
    }

    async fn handle_response(&self, value: Value) {
        let Some(key) = value.get("id").and_then(response_key) else {
            debug!("received tool host frame without usable id");
            return;
        };

        let responder = {
            let mut pending = self.pending.lock().await;
            pending.remove(&key)
        };

        let Some(sender) = responder else {
            debug!(response_id = key, "received response for unknown request");
            return;
        };

        if let Some(error) = value.get("error").and_then(Value::as_object) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let _ = sender.send(Err(ToolInvokeError::Rpc { code, message }));
        } else {
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            let _ = sender.send(Ok(result));
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        self.write_message(&payload).await?;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ToolInvokeError::Cancelled),
        }
    }

    async fn write_message(&self, message: &Value) -> Result<(), ToolInvokeError> {
        let encoded = serde_json::to_string(message)
            .map_err(|source| ToolInvokeError::InvalidJson { source })?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| transport_error("writer not initialised"))?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        Ok(())
    }

    async fn reset(&self) {
        {
            let mut writer = self.writer.lock().await;
            *writer = None;
        }

        let mut state = self.state.lock().await;
        if let Some(mut running) = state.take() {
            if let Err(err) = running.child.kill().await {
                debug!(%err, "failed to kill tool host process (may have already exited)");
            }
            let _ = running.child.wait().await;
        }
        drop(state);

        self.fail_all_pending().await;
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(ToolInvokeError::Terminated));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }
}

fn transport_error(message: impl Into<String>) -> ToolInvokeError {
    ToolInvokeError::Transport {
        message: message.into(),
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ToolListing {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}
