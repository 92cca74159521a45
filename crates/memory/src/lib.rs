//! Conversation memory for Parley.
//!
//! The agent keeps every turn of the conversation as a [`MemoryRecord`] in a
//! [`ChatHistoryMemory`]. Before each model call the memory derives a bounded
//! view of that log (the context window) without touching the log itself.

pub mod chat_history;
pub mod context;
pub mod record;

pub use chat_history::ChatHistoryMemory;
pub use context::{AssembledContext, ContextWindow, assemble};
pub use record::MemoryRecord;
