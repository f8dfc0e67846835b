//! Tool-host process: serves the capability registry over stdio JSON-RPC.

pub mod gitlab;
pub mod guidelines;
pub mod jira;
pub mod registry;

use crate::infrastructure::rpc::{RpcRequest, RpcResponse};
use registry::{RegistryError, ToolRegistry};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize host response: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read one JSON-RPC request per line from stdin, answer one response per
/// line on stdout, until the orchestrator closes the pipe. Requests are
/// handled strictly in order; that sequencing is what makes the registry's
/// reference cache visible to later calls in the same assistant turn.
pub async fn serve(mut registry: ToolRegistry) -> Result<(), HostError> {
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    info!("Tool host serving on stdio");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received tool host frame");

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => handle_request(&mut registry, request).await,
            Err(error) => {
                warn!(%error, "Failed to parse tool host request line");
                RpcResponse::parse_error(format!("invalid JSON-RPC frame: {error}"))
            }
        };

        write_response(&mut stdout, &response).await?;
    }

    info!("Orchestrator closed the channel; tool host exiting");
    stdout.flush().await?;
    Ok(())
}

pub(crate) async fn handle_request(
    registry: &mut ToolRegistry,
    request: RpcRequest,
) -> RpcResponse {
    if request.jsonrpc != "2.0" {
        return RpcResponse::invalid_request("Unsupported jsonrpc version (expected 2.0)");
    }

    match request.method.as_str() {
        "tools/list" => RpcResponse::success(
            request.id,
            json!({ "tools": registry.descriptors() }),
        ),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return RpcResponse::invalid_params(
                    request.id,
                    "params.name must name the tool to invoke",
                );
            };
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));

            info!(tool = name, "Dispatching tool invocation");
            match registry.invoke(name, arguments).await {
                Ok(result) => RpcResponse::success(request.id, result),
                Err(RegistryError::UnknownTool(tool)) => RpcResponse::error(
                    request.id,
                    -32601,
                    format!("Tool '{tool}' is not provided by this host."),
                ),
            }
        }
        other => RpcResponse::method_not_found(request.id, other),
    }
}

async fn write_response(stdout: &mut io::Stdout, response: &RpcResponse) -> Result<(), HostError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    stdout.write_all(&payload).await?;
    stdout.flush().await?;
    Ok(())
}
