pub mod chat;
pub mod config_cmd;
pub mod tools;

use std::sync::Arc;
use anyhow::{Context, bail};
use parley_agent::{ChatAgent, ResponseWordsTerminator};
use parley_config::ParleyConfig;
use parley_core::message::{Message, RoleType};
use parley_core::model::{ModelBackend, StubModel};

/// Resolve the configured backend name.
pub fn model_backend(name: &str) -> anyhow::Result<Arc<dyn ModelBackend>> {
    match name {
        "stub" => Ok(Arc::new(StubModel)),
        other => bail!("Unknown model backend '{other}' (available: stub)"),
    }
}

/// Build a chat agent from configuration.
pub fn build_agent(config: &ParleyConfig, with_tools: bool) -> anyhow::Result<ChatAgent> {
    let agent_cfg = &config.agent;
    let system = Message::new(
        agent_cfg.role_name.as_str(),
        RoleType::Assistant,
        agent_cfg.system_prompt.as_str(),
    );

    let mut agent = ChatAgent::new(system, model_backend(&config.default_model)?)
        .with_model_config(config.model.clone())
        .with_max_tool_depth(agent_cfg.max_tool_depth);

    if let Some(limit) = agent_cfg.token_limit {
        agent = agent.with_token_limit(limit);
    }
    if let Some(size) = agent_cfg.message_window_size {
        agent = agent.with_message_window(size);
    }
    if !config.terminators.words.is_empty() {
        let words = ResponseWordsTerminator::new(
            config
                .terminators
                .words
                .iter()
                .map(|(word, n)| (word.clone(), *n)),
        )
        .context("Invalid [terminators] configuration")?;
        agent = agent.with_terminator(Box::new(words));
    }
    if with_tools {
        agent = agent
            .with_tools(parley_tools::default_tools())
            .context("Failed to register built-in tools")?;
    }
    if let Some(language) = &agent_cfg.output_language {
        agent = agent.with_output_language(language.as_str());
    }

    Ok(agent)
}
