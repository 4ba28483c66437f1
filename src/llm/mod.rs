//! Chat model collaborators.
//!
//! The workflow only ever needs "send prompt (and maybe an image), receive
//! text", which is what [`ChatModel`] captures. [`OpenAiClient`] talks to any
//! OpenAI-compatible endpoint; [`ScriptedModel`] replays canned responses.

mod openai;
mod scripted;

pub use openai::OpenAiClient;
pub use scripted::{RequestLog, ScriptedModel};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::StageError;

/// Anything that can answer a chat request with text.
pub trait ChatModel {
    fn complete(&self, request: &ChatRequest) -> Result<String, StageError>;
}

impl<M: ChatModel + ?Sized> ChatModel for Box<M> {
    fn complete(&self, request: &ChatRequest) -> Result<String, StageError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Plain text when there is nothing but text, a part list otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// All text parts of the message joined with newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Image URLs attached to the message.
    pub fn images(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => vec![],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }

    fn push_image(&mut self, url: String) {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        };
        match &mut self.content {
            MessageContent::Parts(parts) => parts.push(part),
            MessageContent::Text(text) => {
                let text = std::mem::take(text);
                self.content = MessageContent::Parts(vec![ContentPart::Text { text }, part]);
            }
        }
    }
}

/// Body of an OpenAI-style `/chat/completions` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Text of the last user message, or empty.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(ChatMessage::text)
            .unwrap_or_default()
    }

    pub fn has_image(&self) -> bool {
        self.messages.iter().any(|m| !m.images().is_empty())
    }
}

/// Encode PNG bytes as a `data:` URL the vision endpoints accept.
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Fluent request builder handed out by [`crate::Ctx::llm`].
pub struct LlmRequest<'a> {
    model: Option<&'a dyn ChatModel>,
    request: ChatRequest,
}

impl<'a> LlmRequest<'a> {
    pub(crate) fn new(model: Option<&'a dyn ChatModel>, max_tokens: Option<u32>) -> Self {
        Self {
            model,
            request: ChatRequest {
                model: String::new(),
                messages: vec![],
                max_tokens,
            },
        }
    }

    /// Model identifier sent to the endpoint.
    pub fn model(mut self, id: impl Into<String>) -> Self {
        self.request.model = id.into();
        self
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.request
            .messages
            .push(ChatMessage::new(Role::System, text));
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.request.messages.push(ChatMessage::new(Role::User, text));
        self
    }

    /// Attach a PNG to the most recent user message.
    pub fn image_png(mut self, png: &[u8]) -> Self {
        let url = png_data_url(png);
        match self
            .request
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            Some(msg) => msg.push_image(url),
            None => {
                let mut msg = ChatMessage::new(Role::User, "");
                msg.content = MessageContent::Parts(vec![]);
                msg.push_image(url);
                self.request.messages.push(msg);
            }
        }
        self
    }

    pub fn build(self) -> ChatRequest {
        self.request
    }

    pub fn send(self) -> Result<String, StageError> {
        let model = self
            .model
            .ok_or_else(|| StageError::invalid("no chat model configured on ctx"))?;
        if self.request.model.is_empty() {
            return Err(StageError::invalid("chat request has no model id"));
        }
        model.complete(&self.request)
    }
}
