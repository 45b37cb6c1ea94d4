//! OpenAI chat-completions backend.
//!
//! Simple HTTP POST to `{base_url}/chat/completions`; works with any
//! OpenAI-compatible gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionError, CompletionProvider, CompletionResult};

/// LLM calls need time; shorter configured timeouts are raised to this.
pub const MIN_TIMEOUT_SECONDS: u64 = 5;

/// Settings for [`OpenAIChat`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.2,
            base_url: crate::embedding::openai::DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

/// OpenAI chat-completions client.
pub struct OpenAIChat {
    client: reqwest::Client,
    settings: ChatSettings,
    api_key: String,
}

impl OpenAIChat {
    /// Create a new chat client.
    ///
    /// # Errors
    /// Returns `CompletionError::ConfigError` if the HTTP client cannot be built
    pub fn new(api_key: String, mut settings: ChatSettings) -> CompletionResult<Self> {
        if settings.timeout_seconds < MIN_TIMEOUT_SECONDS {
            warn!(
                "Configured timeout_seconds={} is too low; using minimum of {} seconds",
                settings.timeout_seconds, MIN_TIMEOUT_SECONDS
            );
            settings.timeout_seconds = MIN_TIMEOUT_SECONDS;
        }
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first non-blank message out of a chat response.
fn first_content(response: ChatResponse) -> CompletionResult<String> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
        .ok_or(CompletionError::EmptyResponse)
}

#[async_trait]
impl CompletionProvider for OpenAIChat {
    async fn complete(&self, system: &str, user: &str) -> CompletionResult<String> {
        debug!(
            "Requesting completion from {} ({} chars of prompt)",
            self.settings.model,
            system.len() + user.len()
        );

        let request = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::ApiError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Chat completions API error: {} - {}", status, body);
            return Err(CompletionError::ApiError(format!("{} - {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::ApiError(format!("Failed to parse response: {}", e)))?;

        first_content(chat_response)
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}
