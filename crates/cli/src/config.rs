//! Configuration loading from parley.toml.

use runtime::orchestrator::{ANSWER_TEMPERATURE, TOOL_SELECTION_TEMPERATURE};
use runtime::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_TOOLS_MODEL, OrchestratorConfig, PhaseSettings,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
///
/// Every field has a built-in default, so an empty file is valid.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default = "default_tool_selection")]
    pub tool_selection: PhaseConfig,

    #[serde(default = "default_answer")]
    pub answer: PhaseConfig,
}

/// Inference endpoint configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL including the `/v1` segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Placeholder key; local servers usually ignore it.
    #[serde(default)]
    pub api_key: String,

    /// Optional per-request timeout, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            request_timeout_secs: None,
        }
    }
}

/// Model settings for one protocol phase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    pub model: String,
    pub temperature: f32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_tool_selection() -> PhaseConfig {
    PhaseConfig {
        model: DEFAULT_TOOLS_MODEL.to_string(),
        temperature: TOOL_SELECTION_TEMPERATURE,
    }
}

fn default_answer() -> PhaseConfig {
    PhaseConfig {
        model: DEFAULT_CHAT_MODEL.to_string(),
        temperature: ANSWER_TEMPERATURE,
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        Self {
            backend: BackendConfig::default(),
            tool_selection: default_tool_selection(),
            answer: default_answer(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".into()));
        }
        for (name, phase) in [("tool_selection", &self.tool_selection), ("answer", &self.answer)] {
            if phase.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name}.model is empty")));
            }
            if !(0.0..=2.0).contains(&phase.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "{name}.temperature must be between 0 and 2, got {}",
                    phase.temperature
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.backend.request_timeout_secs.map(Duration::from_secs)
    }

    /// Phase settings for the orchestrator.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            tool_selection: PhaseSettings::new(
                &self.tool_selection.model,
                self.tool_selection.temperature,
            ),
            answer: PhaseSettings::new(&self.answer.model, self.answer.temperature),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
