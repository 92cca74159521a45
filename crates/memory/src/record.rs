//! A message as stored in conversation memory.

use chrono::{DateTime, Utc};
use parley_core::message::{BackendRole, Message, Turn};
use serde::{Deserialize, Serialize};

/// A [`Message`] tagged with how it is presented to the model.
///
/// `seq` is assigned by the memory on write and increases monotonically for
/// the lifetime of the memory, across `clear()` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub message: Message,
    pub backend_role: BackendRole,
    #[serde(default)]
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(message: Message, backend_role: BackendRole) -> Self {
        Self {
            message,
            backend_role,
            seq: 0,
            created_at: Utc::now(),
        }
    }

    /// Render as a provider-facing turn.
    pub fn to_turn(&self) -> Turn {
        self.message.to_turn(self.backend_role)
    }
}
