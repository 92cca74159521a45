//! What a step hands back to the caller.

use crate::dispatcher::FunctionCallingRecord;
use crate::termination::TerminationReason;
use parley_core::error::{Error, Result};
use parley_core::message::Message;
use parley_core::model::Usage;
use serde::Serialize;

/// Bookkeeping for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepInfo {
    /// Response identifier from the backend; `None` when the model was not
    /// consulted or its output was withheld.
    pub id: Option<String>,
    pub usage: Option<Usage>,
    pub termination_reasons: Vec<TerminationReason>,
    /// Tokens in the context sent to the model, plus the completion.
    pub num_tokens: usize,
    /// Every tool invoked during the step, in call order.
    pub tool_calls: Vec<FunctionCallingRecord>,
    pub finish_reasons: Vec<String>,
}

impl StepInfo {
    /// The info as a JSON object.
    pub fn to_map(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Internal(format!("step info serialized to {other}"))),
        }
    }
}

/// The result of [`ChatAgent::step`](crate::ChatAgent::step).
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    /// Candidate messages, one per completion requested.
    pub msgs: Vec<Message>,
    pub terminated: bool,
    pub info: StepInfo,
}

impl AgentResponse {
    /// The only message of a single-candidate response.
    pub fn msg(&self) -> Result<&Message> {
        match self.msgs.as_slice() {
            [only] => Ok(only),
            msgs => Err(Error::SingleMessageExpected { count: msgs.len() }),
        }
    }
}
