use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("failed to spawn tool host '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool host transport error: {message}")]
    Transport { message: String },
    #[error("failed to encode tool host request: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("tool host returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("tool host process terminated unexpectedly")]
    Terminated,
    #[error("tool host request cancelled")]
    Cancelled,
}
