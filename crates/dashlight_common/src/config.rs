//! Dashlight configuration.
//!
//! A TOML file with four sections: `[llm]`, `[retry]`, `[engine]` and
//! `[display]`. Every field has a default, so an empty or partial file is
//! valid.
//!
//! Lookup order: an explicit path, then `$DASHLIGHT_CONFIG`, then
//! `<config dir>/dashlight/config.toml`, then built-in defaults.

use dashlight_shared::{DiagError, DisplayTables, Knowledge};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "DASHLIGHT_CONFIG";
pub const API_KEY_ENV: &str = "DASHLIGHT_API_KEY";
pub const ENDPOINT_ENV: &str = "DASHLIGHT_LLM_ENDPOINT";
const CONFIG_DIR: &str = "dashlight";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which wire format the completion endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    /// Guess from the endpoint URL.
    #[default]
    Auto,
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api: ApiStyle,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_timeout_secs() -> u64 {
    12
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            api: ApiStyle::Auto,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before retry N; the last entry repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,

    /// Upper bound of the random delay added to each backoff
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> Vec<u64> {
    vec![300, 800, 1500]
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Replaces the embedded light KB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_path: Option<PathBuf>,

    /// Replaces the embedded scenario graphs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios_path: Option<PathBuf>,

    #[serde(default = "default_max_bridge_questions")]
    pub max_bridge_questions: u32,

    #[serde(default = "default_option_map_attempts")]
    pub option_map_attempts: u32,
}

fn default_max_bridge_questions() -> u32 {
    3
}

fn default_option_map_attempts() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kb_path: None,
            scenarios_path: None,
            max_bridge_questions: default_max_bridge_questions(),
            option_map_attempts: default_option_map_attempts(),
        }
    }
}

impl EngineConfig {
    /// Embedded knowledge, with any configured files swapped in.
    pub fn load_knowledge(&self) -> Result<Knowledge, DiagError> {
        Knowledge::from_paths(self.kb_path.as_deref(), self.scenarios_path.as_deref())
    }
}

/// Percent tables for the cosmetic `displayPercent` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_high")]
    pub high: Vec<u32>,
    #[serde(default = "default_medium")]
    pub medium: Vec<u32>,
    #[serde(default = "default_low")]
    pub low: Vec<u32>,
}

fn default_high() -> Vec<u32> {
    DisplayTables::default().high
}

fn default_medium() -> Vec<u32> {
    DisplayTables::default().medium
}

fn default_low() -> Vec<u32> {
    DisplayTables::default().low
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

impl DisplayConfig {
    pub fn tables(&self) -> DisplayTables {
        DisplayTables {
            high: self.high.clone(),
            medium: self.medium.clone(),
            low: self.low.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashlightConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// `<config dir>/dashlight/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
}

impl DashlightConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Resolve and load the config, then apply environment overrides.
    ///
    /// An explicit or `$DASHLIGHT_CONFIG` path must exist; a missing file at
    /// the default location just means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let (mut config, source) = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => (Self::from_file(&path)?, Some(path)),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => (Self::from_file(&path)?, Some(path)),
                None => {
                    debug!("No config file, using defaults");
                    (Self::default(), None)
                }
            },
        };
        if let Some(path) = &source {
            info!(path = %path.display(), "Loaded config");
        }
        config.apply_env(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(ENDPOINT_ENV).ok(),
        );
        Ok((config, source))
    }

    /// Environment values win over the file; an endpoint from the
    /// environment also enables the completion service.
    pub fn apply_env(&mut self, api_key: Option<String>, endpoint: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.llm.endpoint = endpoint;
            self.llm.enabled = true;
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The same config with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("********".to_string());
        }
        copy
    }
}
