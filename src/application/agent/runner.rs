use super::errors::AgentError;
use super::models::{ReviewOutcome, ReviewStep};
use super::prompts::{REVIEW_SYSTEM_PROMPT, review_request};
use crate::application::tooling::ToolTransport;
use crate::domain::types::{ChatMessage, MessageRole, ToolCall};
use crate::infrastructure::model::{ModelProvider, ModelRequest};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The orchestrator side of the session: owns the transcript, asks the model
/// for the next action, and folds tool results back in until the model
/// produces a turn without tool calls.
pub struct ReviewAgent<P: ModelProvider> {
    provider: P,
    transport: Arc<dyn ToolTransport>,
    model: String,
}

impl<P: ModelProvider> ReviewAgent<P> {
    pub fn new(provider: P, transport: Arc<dyn ToolTransport>, model: impl Into<String>) -> Self {
        Self {
            provider,
            transport,
            model: model.into(),
        }
    }

    pub async fn run(&self, project_id: &str, mr_iid: &str) -> Result<ReviewOutcome, AgentError> {
        info!(project_id, mr_iid, "Review session started");

        let tools = self.transport.list_tools().await?;
        debug!(tools = tools.len(), "Tool catalogue received from host");

        let mut transcript = vec![
            ChatMessage::text(MessageRole::System, REVIEW_SYSTEM_PROMPT),
            ChatMessage::text(MessageRole::User, review_request(project_id, mr_iid)),
        ];
        let mut steps: Vec<ReviewStep> = Vec::new();
        let mut iteration = 0usize;

        // Unbounded by design: the stopping rule is the model's, not ours.
        loop {
            iteration += 1;
            info!(iteration, messages = transcript.len(), "Requesting next assistant turn");

            let response = self
                .provider
                .chat(ModelRequest {
                    model: self.model.clone(),
                    messages: transcript.clone(),
                    tools: tools.clone(),
                })
                .await?;

            let Some(message) = response.message else {
                warn!(iteration, "Model returned no choice; stopping session");
                return Ok(ReviewOutcome {
                    response: String::new(),
                    steps,
                });
            };

            let tool_calls = message.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                let response = message.content.unwrap_or_default();
                info!(iteration, "Model produced the final review summary");
                return Ok(ReviewOutcome { response, steps });
            }

            transcript.push(message);

            // Strictly sequential: a later call may depend on host state a
            // previous call in this turn just mutated (the diff_refs cache).
            for call in tool_calls {
                let arguments = parse_arguments(&call);
                info!(tool = %call.function.name, call_id = %call.id, "Dispatching tool call");

                let output = self
                    .transport
                    .call_tool(&call.function.name, arguments.clone())
                    .await?;

                transcript.push(ChatMessage::tool_result(call.id.clone(), output.to_string()));
                steps.push(ReviewStep {
                    call_id: call.id,
                    tool: call.function.name,
                    arguments,
                    output,
                });
            }
        }
    }
}

/// A malformed argument payload degrades to the empty argument set; one bad
/// call must never abort the session.
fn parse_arguments(call: &ToolCall) -> Value {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return json!({});
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(tool = %call.function.name, %err, "Failed to parse tool arguments; using empty object");
            json!({})
        }
    }
}
