//! Token counting.
//!
//! The context window assembler asks a [`TokenCounter`] what a rendered turn
//! costs; it never tokenizes anything itself. [`HeuristicTokenCounter`] uses a
//! character-based estimate (~4 characters per token), which is within ~10%
//! of BPE tokenizers on English text.

use crate::message::Turn;

/// Per-turn overhead for role name, delimiters and formatting markers.
pub const TURN_OVERHEAD: usize = 4;

/// Flat cost charged for each attached image.
pub const IMAGE_TOKENS: usize = 85;

/// Counts tokens for rendered text.
pub trait TokenCounter: Send + Sync {
    /// Token count of a piece of text.
    fn count_text(&self, text: &str) -> usize;

    /// Token count of one rendered turn, including overhead and images.
    fn count_turn(&self, turn: &Turn) -> usize {
        TURN_OVERHEAD + self.count_text(&turn.text_content()) + turn.image_count() * IMAGE_TOKENS
    }

    /// Token count of a slice of turns.
    fn count_turns(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|t| self.count_turn(t)).sum()
    }
}

/// 1 token ≈ 4 characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}
