use serde::Serialize;
use serde_json::Value;

/// One dispatched tool invocation, kept for progress reporting and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewStep {
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
    pub output: Value,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub response: String,
    pub steps: Vec<ReviewStep>,
}
