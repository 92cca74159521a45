//! The Parley chat agent.
//!
//! A step follows a **Remember → Ask → Act → Decide** cycle:
//!
//! 1. **Remember** the input message
//! 2. **Ask** the model, with as much recent conversation as fits the window
//! 3. **Act** on any function call: run the tool, remember the result, ask again
//! 4. **Decide** whether the conversation is over, remember the reply, return it
//!
//! The loop ends when the model answers in text or the tool depth ceiling is
//! reached; at the ceiling the model is asked once more without tools.

mod completion;
pub mod chat_agent;
pub mod dispatcher;
pub mod prompts;
pub mod response;
pub mod termination;

#[cfg(test)]
mod test_helpers;

pub use chat_agent::{ChatAgent, DEFAULT_MAX_TOOL_DEPTH};
pub use dispatcher::{FunctionCallingRecord, ToolDispatcher};
pub use prompts::{SystemMessageGenerator, TaskType};
pub use response::{AgentResponse, StepInfo};
pub use termination::{
    ResponseWordsTerminator, TerminationContext, TerminationReason, Terminator,
    TokenLimitTerminator,
};
