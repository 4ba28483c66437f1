use crate::llm::{ChatModel, LlmRequest};

/// Execution context for stages: the chat model and a human-readable run
/// log.
pub struct Ctx {
    log: Vec<String>,
    model: Option<Box<dyn ChatModel>>,
    max_tokens: Option<u32>,
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            log: vec![],
            model: None,
            max_tokens: None,
        }
    }

    /// A context whose [`llm`](Ctx::llm) requests go to `model`.
    pub fn with_model(model: impl ChatModel + 'static) -> Self {
        let mut ctx = Self::new();
        ctx.model = Some(Box::new(model));
        ctx
    }

    /// Cap completion length on every request built from this context.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Start a chat request against the configured model.
    pub fn llm(&self) -> LlmRequest<'_> {
        LlmRequest::new(self.model.as_deref(), self.max_tokens)
    }

    pub fn log(&mut self, msg: impl Into<String>) {
        self.log.push(msg.into());
    }

    pub fn logs(&self) -> &[String] {
        &self.log
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}
