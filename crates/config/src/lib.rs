//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::model::ModelConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Model backend to talk to
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Generation parameters
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Termination rules beyond the token limit
    #[serde(default)]
    pub terminators: TerminatorsConfig,
}

fn default_model() -> String {
    "stub".into()
}

/// `[agent]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_role_name")]
    pub role_name: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Keep only this many recent records in the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_window_size: Option<usize>,

    /// Token ceiling; the model's own limit when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<usize>,

    /// Tool round-trips allowed per step
    #[serde(default = "default_max_tool_depth")]
    pub max_tool_depth: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
}

fn default_role_name() -> String {
    "assistant".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_max_tool_depth() -> usize {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            role_name: default_role_name(),
            system_prompt: default_system_prompt(),
            message_window_size: None,
            token_limit: None,
            max_tool_depth: default_max_tool_depth(),
            output_language: None,
        }
    }
}

/// `[terminators]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminatorsConfig {
    /// Trigger word → number of occurrences that ends the conversation
    #[serde(default)]
    pub words: BTreeMap<String, usize>,
}

impl ParleyConfig {
    /// Load configuration from the default location.
    ///
    /// Falls back to defaults if the config file doesn't exist.
    /// Environment variables override file settings.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `PARLEY_MODEL` and `PARLEY_OUTPUT_LANGUAGE`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.default_model = model;
        }
        if let Some(language) = lookup("PARLEY_OUTPUT_LANGUAGE") {
            self.agent.output_language = Some(language);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model;
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(model.top_p > 0.0 && model.top_p <= 1.0) {
            return Err(ConfigError::ValidationError(
                "model.top_p must be greater than 0.0 and at most 1.0".into(),
            ));
        }
        if model.n == 0 {
            return Err(ConfigError::ValidationError("model.n must be at least 1".into()));
        }

        let agent = &self.agent;
        if agent.message_window_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.message_window_size must be at least 1".into(),
            ));
        }
        if agent.token_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.token_limit must be at least 1".into(),
            ));
        }
        if agent.max_tool_depth == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_depth must be at least 1".into(),
            ));
        }

        if let Some((word, _)) = self.terminators.words.iter().find(|(_, n)| **n == 0) {
            return Err(ConfigError::ValidationError(format!(
                "terminators.words.{word} must be at least 1"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            terminators: TerminatorsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for parley_core::Error {
    fn from(e: ConfigError) -> Self {
        parley_core::Error::Config {
            message: e.to_string(),
        }
    }
}
