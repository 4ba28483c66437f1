use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ChatModel, ChatRequest};
use crate::error::StageError;

/// Shared view of the requests a [`ScriptedModel`] has received.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<ChatRequest>>>);

impl RequestLog {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.0.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, request: ChatRequest) {
        if let Ok(mut r) = self.0.lock() {
            r.push(request);
        }
    }
}

/// Replays canned responses in order and records every request.
///
/// Useful for offline runs and tests. Running out of responses is a
/// [`StageError::Model`].
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    log: RequestLog,
}

impl ScriptedModel {
    pub fn new<I, T>(responses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            log: RequestLog::default(),
        }
    }

    /// Handle that stays valid after the model is moved into a `Ctx`.
    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, request: &ChatRequest) -> Result<String, StageError> {
        self.log.push(request.clone());
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| StageError::model("scripted model poisoned"))?;
        responses
            .pop_front()
            .ok_or_else(|| StageError::model("scripted model has no responses left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmRequest;

    #[test]
    fn replays_in_order_then_errors() {
        let model = ScriptedModel::new(["one", "two"]);
        let log = model.log();
        let req = LlmRequest::new(None, None).model("m").user("q").build();

        assert_eq!(model.complete(&req).unwrap(), "one");
        assert_eq!(model.complete(&req).unwrap(), "two");
        assert!(model.complete(&req).unwrap_err().is_model());
        assert_eq!(log.len(), 3);
    }
}
