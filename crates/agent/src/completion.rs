//! Fetching one completion from the backend.
//!
//! Streamed responses are folded back into whole choices here, so the rest of
//! the agent only ever deals with complete candidates.

use std::collections::BTreeMap;
use parley_core::error::ProviderError;
use parley_core::model::{Choice, FunctionCallRequest, ModelBackend, ModelRequest, StreamChunk, Usage};
use parley_core::token::TokenCounter;
use tracing::debug;

/// A backend response with usage filled in.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// Send `request` and wait for the whole answer.
///
/// `prompt_tokens` is what the context was measured at; it stands in for the
/// backend's prompt count when the backend reports no usage.
pub(crate) async fn fetch(
    backend: &dyn ModelBackend,
    request: ModelRequest,
    prompt_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<Completion, ProviderError> {
    let (id, model, choices, usage) = if request.config.stream {
        let mut rx = backend.stream(request).await?;
        let mut stream = StreamAggregate::default();
        while let Some(chunk) = rx.recv().await {
            stream.push(chunk?);
        }
        debug!(chunks = stream.chunks, "Stream finished");
        let id = stream.id.clone().unwrap_or_default();
        let usage = stream.usage;
        (id, backend.name().to_string(), stream.into_choices(), usage)
    } else {
        let response = backend.complete(request).await?;
        (response.id, response.model, response.choices, response.usage)
    };

    if choices.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let usage = usage.unwrap_or_else(|| {
        let completion_tokens = choices
            .iter()
            .filter_map(|c| c.content.as_deref())
            .map(|text| counter.count_text(text))
            .sum();
        Usage::new(prompt_tokens, completion_tokens)
    });

    Ok(Completion {
        id,
        model,
        choices,
        usage,
    })
}

/// Per-choice accumulation of stream deltas.
#[derive(Debug, Default)]
struct StreamAggregate {
    id: Option<String>,
    usage: Option<Usage>,
    choices: BTreeMap<usize, Choice>,
    chunks: usize,
}

impl StreamAggregate {
    fn push(&mut self, chunk: StreamChunk) {
        self.chunks += 1;
        if self.id.is_none() {
            self.id = chunk.id;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let choice = self.choices.entry(chunk.index).or_insert_with(|| Choice {
            index: chunk.index,
            content: None,
            function_call: None,
            finish_reason: None,
        });

        if let Some(delta) = chunk.content {
            choice.content.get_or_insert_with(String::new).push_str(&delta);
        }
        if let Some(delta) = chunk.function_call {
            let call = choice.function_call.get_or_insert_with(|| FunctionCallRequest {
                name: String::new(),
                arguments: String::new(),
            });
            if call.name.is_empty() {
                call.name = delta.name;
            }
            call.arguments.push_str(&delta.arguments);
        }
        if chunk.finish_reason.is_some() {
            choice.finish_reason = chunk.finish_reason;
        }
    }

    fn into_choices(self) -> Vec<Choice> {
        self.choices.into_values().collect()
    }
}
