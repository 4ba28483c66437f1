//! Configuration loaded from an optional TOML file plus environment overrides.
//!
//! ```toml
//! [llm]
//! base_url = "http://localhost:11434/v1"
//! api_key_env = "OPENAI_API_KEY"
//! timeout_secs = 120
//!
//! [workflow]
//! on_missing_block = "abort"
//! on_script_error = "report"
//!
//! [render]
//! width = 1024
//! height = 600
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StageError;

pub const ENV_BASE_URL: &str = "CHART_REFLECT_BASE_URL";
pub const ENV_API_KEY_ENV: &str = "CHART_REFLECT_API_KEY_ENV";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for StageError {
    fn from(e: ConfigError) -> Self {
        StageError::Config(e.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 120,
            max_tokens: None,
        }
    }
}

/// What to do when a model response carries no delimited block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingBlockPolicy {
    /// Log, produce no chart for that round, keep going.
    #[default]
    Skip,
    Abort,
}

/// What to do when a chart script fails to evaluate or render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptErrorPolicy {
    /// Record the failure on the round and return a partial result.
    #[default]
    Report,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub block_start: String,
    pub block_end: String,
    pub image_ext: String,
    pub on_missing_block: MissingBlockPolicy,
    pub on_script_error: ScriptErrorPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            block_start: "<execute_python>".into(),
            block_end: "</execute_python>".into(),
            image_ext: "png".into(),
            on_missing_block: MissingBlockPolicy::default(),
            on_script_error: ScriptErrorPolicy::default(),
        }
    }
}

/// Canvas size used when a script has no `size` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
        }
    }
}

impl Config {
    /// Read `path` if given, apply env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_toml(&std::fs::read_to_string(p)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.llm.base_url = url;
        }
        if let Some(name) = lookup(ENV_API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.llm.api_key_env = name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let wf = &self.workflow;
        if wf.block_start.is_empty() || wf.block_end.is_empty() {
            return Err(ConfigError::InvalidValue(
                "block markers must not be empty".into(),
            ));
        }
        if wf.image_ext.is_empty() || wf.image_ext.contains(['.', '/', '\\']) {
            return Err(ConfigError::InvalidValue(format!(
                "image_ext {:?} must be a bare extension",
                wf.image_ext
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::InvalidValue(
                "render width and height must be positive".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
