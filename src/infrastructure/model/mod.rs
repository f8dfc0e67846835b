//! Model provider seam and the OpenRouter client behind it.

mod openrouter;

pub use openrouter::OpenRouterClient;

use crate::application::tooling::ToolDescriptor;
use crate::domain::types::ChatMessage;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
}

/// `message` is `None` when the provider returns no choice at all; the
/// caller decides what a degenerate response means.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error calling model provider: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the model provider. Check network access and OPENROUTER_URL."
                        .to_string()
                } else if err.is_timeout() {
                    "The model provider took too long to answer. Try again shortly.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::UNAUTHORIZED => {
                            "The model provider rejected the API key. Check OPENROUTER_API_KEY."
                                .to_string()
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            "The model provider is rate limiting requests. Try again later."
                                .to_string()
                        }
                        _ => format!(
                            "Model provider request failed with status {}.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the model provider.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The model provider returned a response that could not be processed.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
