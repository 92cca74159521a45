//! Shared test helpers for agent tests.

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::model::{Choice, ModelBackend, ModelRequest, ModelResponse, Usage};
use std::sync::Mutex;

/// A model that returns a sequence of scripted responses and remembers every
/// request it was sent.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedModel {
    responses: Mutex<Vec<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    repeat_failure: bool,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).rev().collect()),
            requests: Mutex::new(Vec::new()),
            repeat_failure: false,
        }
    }

    /// A model whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Mutex::new(vec![Err(error)]),
            requests: Mutex::new(Vec::new()),
            repeat_failure: true,
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if self.repeat_failure {
            return responses[0].clone();
        }
        let count = self.requests.lock().unwrap().len();
        responses
            .pop()
            .unwrap_or_else(|| panic!("ScriptedModel: no more responses (call #{count})"))
    }
}

/// A single text answer.
pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        id: "scripted-text".into(),
        model: "scripted".into(),
        choices: vec![Choice::text(0, text)],
        usage: Some(Usage::new(10, 5)),
    }
}

/// A single function call.
pub fn call_response(name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse {
        id: "scripted-call".into(),
        model: "scripted".into(),
        choices: vec![Choice::call(0, name, arguments)],
        usage: Some(Usage::new(10, 5)),
    }
}
