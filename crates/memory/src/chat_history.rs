//! Ordered conversation log with a leading system record.

use std::sync::Arc;
use crate::context::{self, AssembledContext, ContextWindow};
use crate::record::MemoryRecord;
use parley_core::message::{BackendRole, Message, Turn};
use parley_core::token::TokenCounter;
use tracing::{debug, warn};

/// Conversation memory.
///
/// Conceptually the log starts with one SYSTEM record (the agent's system
/// message), followed by every record written since, in write order.
pub struct ChatHistoryMemory {
    system: MemoryRecord,
    log: Vec<MemoryRecord>,
    next_seq: u64,
    window: ContextWindow,
    counter: Arc<dyn TokenCounter>,
}

impl ChatHistoryMemory {
    pub fn new(system_message: Message, window: ContextWindow, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            system: MemoryRecord::new(system_message, BackendRole::System),
            log: Vec::new(),
            next_seq: 1,
            window,
            counter,
        }
    }

    /// Append records, preserving their order.
    pub fn write_records(&mut self, records: impl IntoIterator<Item = MemoryRecord>) {
        for mut record in records {
            if record.backend_role == BackendRole::System {
                warn!(seq = self.next_seq, "System record written to the log; it will not be rendered");
            }
            record.seq = self.next_seq;
            self.next_seq += 1;
            self.log.push(record);
        }
    }

    /// Append a single record.
    pub fn write_record(&mut self, record: MemoryRecord) {
        self.write_records(std::iter::once(record));
    }

    /// Replace the leading system record.
    pub fn set_system_message(&mut self, message: Message) {
        self.system = MemoryRecord::new(message, BackendRole::System);
    }

    pub fn system_record(&self) -> &MemoryRecord {
        &self.system
    }

    /// Conversation records after the system record, oldest first.
    pub fn records(&self) -> &[MemoryRecord] {
        &self.log
    }

    /// Number of records including the system record.
    pub fn len(&self) -> usize {
        self.log.len() + 1
    }

    /// Always false: the system record is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Drop every record except the system record.
    pub fn clear(&mut self) {
        debug!(dropped = self.log.len(), "Clearing conversation memory");
        self.log.clear();
    }

    pub fn window(&self) -> ContextWindow {
        self.window
    }

    pub fn set_window(&mut self, window: ContextWindow) {
        self.window = window;
    }

    /// Every record rendered, system first, ignoring the window.
    pub fn retrieve(&self) -> Vec<Turn> {
        std::iter::once(&self.system)
            .chain(self.log.iter().filter(|r| r.backend_role != BackendRole::System))
            .map(|r| r.to_turn())
            .collect()
    }

    /// The bounded context for the next model call and its token cost.
    pub fn get_context(&self) -> (Vec<Turn>, usize) {
        let assembled = self.assemble_context();
        (assembled.turns, assembled.total_tokens)
    }

    /// Like [`get_context`](Self::get_context), keeping track of what the
    /// window left out.
    pub fn assemble_context(&self) -> AssembledContext {
        let assembled = context::assemble(&self.system, &self.log, self.window, self.counter.as_ref());
        if assembled.dropped > 0 {
            debug!(
                dropped = assembled.dropped,
                tokens = assembled.total_tokens,
                "Context window trimmed older records"
            );
        }
        assembled
    }
}

impl std::fmt::Debug for ChatHistoryMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHistoryMemory")
            .field("system", &self.system)
            .field("log", &self.log)
            .field("window", &self.window)
            .finish()
    }
}
