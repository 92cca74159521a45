//! Model backend trait — the abstraction over LLM completion APIs.
//!
//! A backend receives rendered turns plus generation parameters and returns
//! one or more candidate completions, either in one piece or as a stream of
//! chunks. Transport and wire format are the backend's business; the agent
//! only sees the types in this module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Turn;

/// Default context size assumed when a backend does not advertise one.
pub const DEFAULT_TOKEN_LIMIT: usize = 4096;

/// Generation parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Temperature (0.0 = deterministic, 2.0 = very creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling mass
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Number of parallel completions to generate
    #[serde(default = "default_n")]
    pub n: usize,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    1.0
}

fn default_n() -> usize {
    1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: default_n(),
            stream: false,
            stop: Vec::new(),
            max_tokens: None,
        }
    }
}

/// A tool description sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub turns: Vec<Turn>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    pub config: ModelConfig,
}

/// A function call requested by the model; arguments are raw JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub name: String,
    pub arguments: String,
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallRequest>,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl Choice {
    /// A plain text choice that finished normally.
    pub fn text(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: Some(content.into()),
            function_call: None,
            finish_reason: Some("stop".into()),
        }
    }

    /// A choice that requests a function call.
    pub fn call(index: usize, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            index,
            content: None,
            function_call: Some(FunctionCallRequest {
                name: name.into(),
                arguments: arguments.to_string(),
            }),
            finish_reason: Some("function_call".into()),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete (non-streaming) response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Backend-assigned response identifier
    pub id: String,

    /// Which model actually responded
    pub model: String,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Response identifier (usually repeated on every chunk)
    #[serde(default)]
    pub id: Option<String>,

    /// Which choice this delta belongs to
    #[serde(default)]
    pub index: usize,

    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Function call delta; argument text is appended across chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallRequest>,

    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a streamed completion.
pub type ChunkReceiver = tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core model backend trait.
///
/// The agent calls `complete()` or `stream()` without knowing which backend
/// is behind it.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name (e.g. "stub", "gpt-4o").
    fn name(&self) -> &str;

    /// Context size in tokens.
    fn token_limit(&self) -> usize {
        DEFAULT_TOKEN_LIMIT
    }

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and replays each choice as
    /// a single chunk, with usage on the last one.
    async fn stream(&self, request: ModelRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(response.choices.len().max(1));
        let last = response.choices.len().saturating_sub(1);
        for (i, choice) in response.choices.into_iter().enumerate() {
            let _ = tx
                .send(Ok(StreamChunk {
                    id: Some(response.id.clone()),
                    index: choice.index,
                    content: choice.content,
                    function_call: choice.function_call,
                    finish_reason: choice.finish_reason,
                    usage: if i == last { response.usage } else { None },
                }))
                .await;
        }
        Ok(rx)
    }
}

/// A backend that never leaves the process: every candidate says
/// "Lorem Ipsum" and no tool is ever called.
#[derive(Debug, Clone, Default)]
pub struct StubModel;

impl StubModel {
    pub const REPLY: &'static str = "Lorem Ipsum";
}

#[async_trait]
impl ModelBackend for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ProviderError> {
        let choices = (0..request.config.n.max(1))
            .map(|index| Choice::text(index, Self::REPLY))
            .collect();
        Ok(ModelResponse {
            id: format!("stub-{}", uuid::Uuid::new_v4()),
            model: "stub".into(),
            choices,
            usage: Some(Usage::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(n: usize) -> ModelRequest {
        ModelRequest {
            turns: vec![],
            tools: vec![],
            config: ModelConfig {
                n,
                ..ModelConfig::default()
            },
        }
    }

    #[test]
    fn model_config_defaults() {
        let config = ModelConfig::default();
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.n, 1);
        assert!(!config.stream);
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = Usage::new(113, 2);
        assert_eq!(usage.total_tokens, 115);
    }

    #[test]
    fn call_choice_serializes_arguments_as_text() {
        let choice = Choice::call(0, "mul", serde_json::json!({"a": 2, "b": 8}));
        let call = choice.function_call.unwrap();
        assert_eq!(call.name, "mul");
        assert!(call.arguments.contains("\"a\":2"));
    }

    #[tokio::test]
    async fn stub_honours_n() {
        let response = StubModel.complete(request(3)).await.unwrap();
        assert_eq!(response.choices.len(), 3);
        assert!(response.id.starts_with("stub-"));
        assert!(
            response
                .choices
                .iter()
                .all(|c| c.content.as_deref() == Some(StubModel::REPLY))
        );
    }

    #[tokio::test]
    async fn default_stream_replays_choices() {
        let mut rx = StubModel.stream(request(2)).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].index, 1);
        assert!(chunks[0].usage.is_none());
        assert!(chunks[1].usage.is_some());
    }
}
