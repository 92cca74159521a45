//! System message templates.
//!
//! A template is plain text with `{name}` placeholders. Rendering fills every
//! placeholder from a key/value map; a placeholder with no value is a
//! configuration error rather than being left in the prompt.

use std::collections::HashMap;
use std::sync::LazyLock;
use parley_core::error::{Error, Result};
use parley_core::message::{Message, RoleType};
use regex::Regex;

const DEFAULT_ASSISTANT: &str = "You are a helpful assistant.";
const DEFAULT_USER: &str = "You are a helpful user.";

const SOCIETY_ASSISTANT: &str = "You are {assistant_role}, working with {user_role} on this task: {task}
Stay in your role for the whole conversation.
{user_role} gives you one instruction at a time. Answer each one with a concrete solution or action, and say so plainly if you cannot carry it out.
Do not ask {user_role} questions; ask for clarification only when an instruction cannot be followed as written.";

const SOCIETY_USER: &str = "You are {user_role}, working with {assistant_role} on this task: {task}
Stay in your role for the whole conversation.
Guide {assistant_role} toward finishing the task by giving one instruction at a time, with any input it needs.
When the task is done, reply with a single word: <TASK_DONE>.";

/// Which family of templates to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskType {
    /// Two role-playing agents cooperating on a task.
    AiSociety,
    #[default]
    Default,
}

/// Builds role-specific system messages from templates.
#[derive(Debug, Clone)]
pub struct SystemMessageGenerator {
    assistant_template: String,
    user_template: String,
}

impl SystemMessageGenerator {
    pub fn new(task_type: TaskType) -> Self {
        let (assistant, user) = match task_type {
            TaskType::AiSociety => (SOCIETY_ASSISTANT, SOCIETY_USER),
            TaskType::Default => (DEFAULT_ASSISTANT, DEFAULT_USER),
        };
        Self::with_templates(assistant, user)
    }

    pub fn with_templates(assistant: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            assistant_template: assistant.into(),
            user_template: user.into(),
        }
    }

    pub fn template(&self, role_type: RoleType) -> &str {
        match role_type {
            RoleType::Assistant => &self.assistant_template,
            RoleType::User => &self.user_template,
        }
    }

    /// Render the template for `role_type` into a system message.
    ///
    /// The values are kept on the message as its metadata.
    pub fn generate(
        &self,
        values: &HashMap<String, String>,
        role_name: &str,
        role_type: RoleType,
    ) -> Result<Message> {
        let content = render(self.template(role_type), values)?;
        let meta = values
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        Ok(Message::new(role_name, role_type, content).with_meta(meta))
    }

    /// Render one system message per `(role_name, role_type)` pair, all from
    /// the same values.
    pub fn generate_all(
        &self,
        values: &HashMap<String, String>,
        roles: &[(&str, RoleType)],
    ) -> Result<Vec<Message>> {
        roles
            .iter()
            .map(|(name, role_type)| self.generate(values, name, *role_type))
            .collect()
    }
}

impl Default for SystemMessageGenerator {
    fn default() -> Self {
        Self::new(TaskType::Default)
    }
}

/// `{name}` where `name` is an identifier. Braces around anything else are
/// literal text.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Placeholder names in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Fill every placeholder in `template` from `values`.
pub fn render(template: &str, values: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = values.get(name.as_str()).ok_or_else(|| Error::Config {
            message: format!("no value for template placeholder '{{{}}}'", name.as_str()),
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}
