//! Context window assembly.
//!
//! Turns the system record plus the conversation log into the bounded list of
//! turns sent with a model request. Two bounding strategies:
//!
//! | Window | Keeps |
//! |--------|-------|
//! | `Messages(w)` | system + the last `w` conversation records |
//! | `Tokens(t)` | system (always) + the newest records that fit in `t` |
//!
//! Assembly is deterministic and read-only: identical inputs always produce
//! identical outputs, and the log is never modified.

use crate::record::MemoryRecord;
use parley_core::message::{BackendRole, Turn};
use parley_core::token::TokenCounter;
use serde::{Deserialize, Serialize};

/// How the context window is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWindow {
    /// Keep the last N conversation records.
    Messages(usize),
    /// Keep as many of the newest records as fit in this many tokens.
    Tokens(usize),
    /// Keep everything.
    Unbounded,
}

/// The bounded view handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// System turn first, then conversation turns in chronological order.
    pub turns: Vec<Turn>,
    /// Token cost of `turns`.
    pub total_tokens: usize,
    /// Conversation records left out of the window.
    pub dropped: usize,
}

impl AssembledContext {
    /// Whether the newest conversation record was left out.
    ///
    /// The window is always a suffix of the log, so this only happens when
    /// nothing but the system turn fits.
    pub fn omits_newest(&self) -> bool {
        self.dropped > 0 && self.turns.len() == 1
    }
}

/// Assemble the context for `log` under `window`.
///
/// System-role records inside the log are never rendered; the leading
/// `system` record stands for the agent's system message.
pub fn assemble(
    system: &MemoryRecord,
    log: &[MemoryRecord],
    window: ContextWindow,
    counter: &dyn TokenCounter,
) -> AssembledContext {
    let system_turn = system.to_turn();
    let system_tokens = counter.count_turn(&system_turn);

    let conversation: Vec<&MemoryRecord> = log
        .iter()
        .filter(|r| r.backend_role != BackendRole::System)
        .collect();

    let (kept, history_tokens) = match window {
        ContextWindow::Messages(size) => {
            let start = conversation.len().saturating_sub(size);
            let turns: Vec<Turn> = conversation[start..].iter().map(|r| r.to_turn()).collect();
            let tokens = counter.count_turns(&turns);
            (turns, tokens)
        }
        ContextWindow::Tokens(budget) => {
            // The system record is paid for first; if it alone is over budget
            // nothing else gets in.
            let remaining = budget.saturating_sub(system_tokens);
            let mut used = 0;
            let mut fitted: Vec<(Turn, usize)> = Vec::new();

            // Newest → oldest; stop at the first record that does not fit.
            for record in conversation.iter().rev() {
                let turn = record.to_turn();
                let cost = counter.count_turn(&turn);
                if used + cost > remaining {
                    break;
                }
                used += cost;
                fitted.push((turn, cost));
            }

            // A function result whose call was cut off cannot open the window.
            while fitted
                .last()
                .is_some_and(|(turn, _)| turn.role == BackendRole::Function)
            {
                if let Some((_, cost)) = fitted.pop() {
                    used -= cost;
                }
            }

            let turns = fitted.into_iter().rev().map(|(turn, _)| turn).collect();
            (turns, used)
        }
        ContextWindow::Unbounded => {
            let turns: Vec<Turn> = conversation.iter().map(|r| r.to_turn()).collect();
            let tokens = counter.count_turns(&turns);
            (turns, tokens)
        }
    };

    let dropped = conversation.len() - kept.len();
    let mut turns = Vec::with_capacity(kept.len() + 1);
    turns.push(system_turn);
    turns.extend(kept);

    AssembledContext {
        turns,
        total_tokens: system_tokens + history_tokens,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::{FunctionCallPayload, Message, TurnContent};
    use parley_core::token::HeuristicTokenCounter;

    fn system() -> MemoryRecord {
        MemoryRecord::new(
            Message::assistant("assistant", "You are a help assistant."),
            BackendRole::System,
        )
    }

    fn user(content: &str) -> MemoryRecord {
        MemoryRecord::new(Message::user("User", content), BackendRole::User)
    }

    fn texts(ctx: &AssembledContext) -> Vec<String> {
        ctx.turns
            .iter()
            .map(|t| match &t.content {
                TurnContent::Text(s) => s.clone(),
                TurnContent::Parts(_) => String::new(),
            })
            .collect()
    }

    #[test]
    fn message_window_keeps_trailing_records() {
        let log: Vec<_> = (0..5).map(|i| user(&format!("msg {i}"))).collect();
        let ctx = assemble(&system(), &log, ContextWindow::Messages(2), &HeuristicTokenCounter);
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[0].role, BackendRole::System);
        assert_eq!(texts(&ctx)[1..], ["msg 3".to_string(), "msg 4".to_string()]);
        assert_eq!(ctx.dropped, 3);
    }

    #[test]
    fn message_window_larger_than_log_keeps_all() {
        let log = vec![user("a"), user("b")];
        let ctx = assemble(&system(), &log, ContextWindow::Messages(10), &HeuristicTokenCounter);
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.dropped, 0);
    }

    #[test]
    fn message_window_property_holds_for_many_sizes() {
        for size in 1..6 {
            for len in (size + 1)..10 {
                let log: Vec<_> = (0..len).map(|i| user(&i.to_string())).collect();
                let ctx = assemble(
                    &system(),
                    &log,
                    ContextWindow::Messages(size),
                    &HeuristicTokenCounter,
                );
                assert_eq!(ctx.turns.len(), size + 1);
                let expected: Vec<String> = ((len - size)..len).map(|i| i.to_string()).collect();
                assert_eq!(texts(&ctx)[1..], expected[..]);
            }
        }
    }

    #[test]
    fn token_window_keeps_newest_that_fit() {
        // Each "abcd" user turn costs 1 + 4 overhead = 5 tokens.
        let log: Vec<_> = (0..4).map(|_| user("abcd")).collect();
        let sys_tokens = HeuristicTokenCounter.count_turn(&system().to_turn());
        let ctx = assemble(
            &system(),
            &log,
            ContextWindow::Tokens(sys_tokens + 11),
            &HeuristicTokenCounter,
        );
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.total_tokens, sys_tokens + 10);
        assert_eq!(ctx.dropped, 2);
    }

    #[test]
    fn token_window_stops_at_first_misfit() {
        let log = vec![user("a"), user(&"x".repeat(400)), user("b")];
        let sys_tokens = HeuristicTokenCounter.count_turn(&system().to_turn());
        let ctx = assemble(
            &system(),
            &log,
            ContextWindow::Tokens(sys_tokens + 20),
            &HeuristicTokenCounter,
        );
        // "a" would fit on its own, but the oversized record in between ends the walk.
        assert_eq!(texts(&ctx)[1..], ["b".to_string()]);
    }

    #[test]
    fn oversized_system_record_stands_alone() {
        let log = vec![user("hello")];
        let ctx = assemble(&system(), &log, ContextWindow::Tokens(1), &HeuristicTokenCounter);
        assert_eq!(ctx.turns.len(), 1);
        assert_eq!(
            ctx.total_tokens,
            HeuristicTokenCounter.count_turn(&system().to_turn())
        );
        assert!(ctx.total_tokens > 1);
    }

    #[test]
    fn oversized_newest_record_is_reported() {
        let log = vec![user("hi"), user(&"x".repeat(400))];
        let sys_tokens = HeuristicTokenCounter.count_turn(&system().to_turn());
        let ctx = assemble(
            &system(),
            &log,
            ContextWindow::Tokens(sys_tokens + 20),
            &HeuristicTokenCounter,
        );
        assert_eq!(ctx.turns.len(), 1);
        assert!(ctx.omits_newest());

        let ctx = assemble(&system(), &log, ContextWindow::Unbounded, &HeuristicTokenCounter);
        assert!(!ctx.omits_newest());
    }

    #[test]
    fn token_window_never_opens_with_orphaned_function_result() {
        let call = MemoryRecord::new(
            Message::assistant("assistant", "x".repeat(400)).with_function_call(
                FunctionCallPayload {
                    name: "add".into(),
                    arguments: serde_json::Map::new(),
                    result: None,
                },
            ),
            BackendRole::Assistant,
        );
        let result = MemoryRecord::new(
            Message::assistant("assistant", "").with_function_call(FunctionCallPayload {
                name: "add".into(),
                arguments: serde_json::Map::new(),
                result: Some(serde_json::json!(3)),
            }),
            BackendRole::Function,
        );
        let log = vec![user("what is 1 + 2?"), call, result, user("thanks")];
        let sys_tokens = HeuristicTokenCounter.count_turn(&system().to_turn());
        let ctx = assemble(
            &system(),
            &log,
            ContextWindow::Tokens(sys_tokens + 40),
            &HeuristicTokenCounter,
        );

        let roles: Vec<_> = ctx.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [BackendRole::System, BackendRole::User]);
        assert_eq!(ctx.dropped, 3);
        assert_eq!(
            ctx.total_tokens,
            sys_tokens + HeuristicTokenCounter.count_turn(&ctx.turns[1])
        );
    }

    #[test]
    fn system_records_in_log_are_not_rendered() {
        let log = vec![system(), user("hi")];
        let ctx = assemble(&system(), &log, ContextWindow::Unbounded, &HeuristicTokenCounter);
        assert_eq!(ctx.turns.len(), 2);
        assert_eq!(ctx.dropped, 0);
    }

    #[test]
    fn assembly_is_deterministic() {
        let log: Vec<_> = (0..3).map(|i| user(&format!("m{i}"))).collect();
        let a = assemble(&system(), &log, ContextWindow::Tokens(64), &HeuristicTokenCounter);
        let b = assemble(&system(), &log, ContextWindow::Tokens(64), &HeuristicTokenCounter);
        assert_eq!(a, b);
    }
}
