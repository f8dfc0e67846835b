use super::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use crate::application::tooling::ToolDescriptor;
use crate::domain::types::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// OpenRouter speaks the OpenAI chat-completions dialect, including native
/// function calling. Sampling is pinned to temperature zero so a review run
/// is reproducible for a given merge request.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ModelProvider for OpenRouterClient {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.endpoint("/chat/completions");
        let payload = CompletionRequest::from(&request);
        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending transcript to model provider"
        );

        let response: CompletionResponse = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "mr-reviewer")
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model provider");

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message);

        Ok(ModelResponse { message })
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDeclaration>,
    tool_choice: &'static str,
    temperature: f32,
}

impl From<&ModelRequest> for CompletionRequest {
    fn from(value: &ModelRequest) -> Self {
        Self {
            model: value.model.clone(),
            messages: value.messages.clone(),
            tools: value.tools.iter().map(ToolDeclaration::from).collect(),
            tool_choice: "auto",
            temperature: 0.0,
        }
    }
}

#[derive(Serialize)]
struct ToolDeclaration {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDeclaration,
}

#[derive(Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDescriptor> for ToolDeclaration {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: FunctionDeclaration {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.input_schema.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::MessageRole;
    use serde_json::json;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let client = OpenRouterClient::new("https://openrouter.ai/api/v1/", "sk-test");
        assert_eq!(
            client.endpoint("/chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn request_pins_deterministic_sampling_and_auto_tools() {
        let request = ModelRequest {
            model: "qwen/qwen-2.5".into(),
            messages: vec![ChatMessage::text(MessageRole::User, "review it")],
            tools: vec![ToolDescriptor {
                name: "get_mr_diff".into(),
                description: "Fetch merge request changes.".into(),
                input_schema: json!({"type": "object"}),
            }],
        };
        let payload = serde_json::to_value(CompletionRequest::from(&request)).expect("encode");
        assert_eq!(payload["temperature"], json!(0.0));
        assert_eq!(payload["tool_choice"], json!("auto"));
        assert_eq!(payload["tools"][0]["type"], json!("function"));
        assert_eq!(payload["tools"][0]["function"]["name"], json!("get_mr_diff"));
    }

    #[test]
    fn response_without_choices_yields_no_message() {
        let parsed: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn parses_assistant_turn_with_tool_calls() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {"name": "get_mr_diff", "arguments": "{\"project_id\":\"42\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).expect("parse");
        let message = parsed.choices[0].message.as_ref().expect("message");
        assert_eq!(message.role, MessageRole::Assistant);
        let calls = message.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].id, "call-1");
        assert_eq!(calls[0].function.name, "get_mr_diff");
    }
}
