//! OpenAI-compatible `/chat/completions` client.

use super::LlmProvider;
use super::transport::{HttpTransport, ReqwestTransport};
use crate::cancel::CancelToken;
use crate::config::EndpointConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Chat client for any endpoint speaking the `OpenAI` chat schema.
pub struct OpenAiCompatClient {
    transport: Arc<dyn HttpTransport>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    max_response_bytes: usize,
}

impl OpenAiCompatClient {
    /// Default completion budget.
    pub const DEFAULT_MAX_TOKENS: u32 = 1600;

    /// Creates a client over an arbitrary transport.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(45),
            max_response_bytes: 2 * 1024 * 1024,
        }
    }

    /// Creates a client from an endpoint configuration.
    #[must_use]
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Self {
        let mut client = Self::new(
            Arc::new(ReqwestTransport::from_endpoint(endpoint)),
            endpoint.model.clone(),
        );
        if endpoint.max_tokens > 0 {
            client.max_tokens = endpoint.max_tokens;
        }
        client.timeout = endpoint.timeout;
        client.max_response_bytes = endpoint.max_response_bytes;
        client
    }
}

impl LlmProvider for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    fn complete_with_system(
        &self,
        system: &str,
        user: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
        };
        let body = serde_json::to_value(&request).map_err(|e| Error::Transport {
            operation: "chat/completions".to_string(),
            cause: e.to_string(),
        })?;

        let bytes = self.transport.post_json(
            "/chat/completions",
            &body,
            self.timeout,
            self.max_response_bytes,
            cancel,
        )?;

        let response: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("chat completion response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::Parse("no completion text in response".to_string()))
    }
}

/// Request to the Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

/// A chat message.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Response from the Chat Completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
