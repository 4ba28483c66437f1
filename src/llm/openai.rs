use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use ureq::Agent;

use super::{ChatModel, ChatRequest};
use crate::config::LlmConfig;
use crate::error::StageError;

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints
/// (OpenAI, Ollama, LM Studio, vLLM).
pub struct OpenAiClient {
    agent: Agent,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Build a client from config, reading the key from the configured env var.
    /// A missing key is allowed: local servers usually don't need one.
    pub fn from_config(config: &LlmConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, StageError> {
        let url = self.endpoint();
        debug!(%url, model = %request.model, messages = request.messages.len(), "chat request");

        let mut builder = self.agent.post(&url);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let body: CompletionResponse = match builder.send_json(request) {
            Ok(mut response) => response.body_mut().read_json()?,
            Err(ureq::Error::StatusCode(401)) => {
                return Err(StageError::model(
                    "authentication failed, check the API key",
                ));
            }
            Err(ureq::Error::StatusCode(429)) => {
                return Err(StageError::model("rate limit exceeded"));
            }
            Err(e) => return Err(e.into()),
        };

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| StageError::model("response had no choices"))
    }
}
