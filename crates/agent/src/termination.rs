//! Termination rules.
//!
//! A rule inspects the messages a step produced (and the step's token count)
//! and may report a reason for ending the conversation. Rules keep their own
//! state between steps and are reset with the agent.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use parley_core::error::Error;
use parley_core::message::Message;
use regex::Regex;
use serde::{Serialize, Serializer};

/// Why a step ended the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The context plus the completion reached the token limit.
    MaxTokensExceeded,
    /// A watched word was seen often enough.
    WordTrigger { word: String },
    /// Raised by a rule outside this crate.
    Custom(String),
}

impl TerminationReason {
    /// Whether the step's candidate messages are withheld from the caller.
    pub fn discards_content(&self) -> bool {
        matches!(self, Self::MaxTokensExceeded)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxTokensExceeded => write!(f, "max_tokens_exceeded"),
            Self::WordTrigger { word } => write!(f, "word_trigger:{word}"),
            Self::Custom(reason) => write!(f, "{reason}"),
        }
    }
}

impl Serialize for TerminationReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct TerminationContext<'a> {
    /// Candidate messages produced by the step; empty before the model runs.
    pub messages: &'a [Message],
    /// Token count of the context, plus the completion once there is one.
    pub num_tokens: usize,
}

/// A rule that can end the conversation.
pub trait Terminator: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect one step's output. Returning a reason terminates the agent.
    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason>;

    /// Forget anything accumulated across steps.
    fn reset(&mut self) {}
}

/// Ends the conversation once the token count reaches the limit.
#[derive(Debug, Clone)]
pub struct TokenLimitTerminator {
    token_limit: usize,
}

impl TokenLimitTerminator {
    pub fn new(token_limit: usize) -> Self {
        Self { token_limit }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }
}

impl Terminator for TokenLimitTerminator {
    fn name(&self) -> &str {
        "token_limit"
    }

    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        (ctx.num_tokens >= self.token_limit).then_some(TerminationReason::MaxTokensExceeded)
    }
}

/// Ends the conversation once a watched word has appeared in responses a
/// given number of times.
///
/// Matching is case-sensitive and on whole words; occurrences accumulate
/// across steps until [`reset`](Terminator::reset).
#[derive(Debug, Clone)]
pub struct ResponseWordsTerminator {
    thresholds: BTreeMap<String, usize>,
    patterns: Vec<(String, Regex)>,
    counts: HashMap<String, usize>,
}

impl ResponseWordsTerminator {
    /// Watch each word until it reaches its threshold. Thresholds must be at
    /// least one.
    pub fn new(
        thresholds: impl IntoIterator<Item = (impl Into<String>, usize)>,
    ) -> Result<Self, Error> {
        let thresholds: BTreeMap<String, usize> = thresholds
            .into_iter()
            .map(|(word, n)| (word.into(), n))
            .collect();
        if let Some((word, _)) = thresholds.iter().find(|(_, n)| **n == 0) {
            return Err(Error::Config {
                message: format!("threshold for word '{word}' must be at least 1"),
            });
        }
        if thresholds.contains_key("") {
            return Err(Error::Config {
                message: "watched words must not be empty".into(),
            });
        }
        let patterns = thresholds
            .keys()
            .map(|word| {
                Regex::new(&word_pattern(word))
                    .map(|re| (word.clone(), re))
                    .map_err(|e| Error::Config {
                        message: format!("cannot watch word '{word}': {e}"),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            thresholds,
            patterns,
            counts: HashMap::new(),
        })
    }

    /// Occurrences of `word` seen so far.
    pub fn count(&self, word: &str) -> usize {
        self.counts.get(word).copied().unwrap_or(0)
    }
}

/// `\b` is only meaningful next to a word character, so a word such as
/// `<TASK_DONE>` is anchored on its inner edges only.
fn word_pattern(word: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let start = if word.starts_with(is_word) { r"\b" } else { "" };
    let end = if word.ends_with(is_word) { r"\b" } else { "" };
    format!("{start}{}{end}", regex::escape(word))
}

impl Terminator for ResponseWordsTerminator {
    fn name(&self) -> &str {
        "response_words"
    }

    fn check(&mut self, ctx: &TerminationContext<'_>) -> Option<TerminationReason> {
        for message in ctx.messages {
            for (word, pattern) in &self.patterns {
                let seen = pattern.find_iter(message.content()).count();
                if seen > 0 {
                    *self.counts.entry(word.clone()).or_default() += seen;
                }
            }
        }
        self.thresholds
            .iter()
            .find(|(word, threshold)| self.count(word) >= **threshold)
            .map(|(word, _)| TerminationReason::WordTrigger { word: word.clone() })
    }

    fn reset(&mut self) {
        self.counts.clear();
    }
}
