use crate::error::AgentError;
use crate::providers::openai::{DEFAULT_API_URL, DEFAULT_MODEL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CHATLOOP_DIR: &str = ".chatloop";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_MAX_ITERATIONS: usize = 8;

pub const ENV_API_KEY: &str = "LLM_API_KEY";
pub const ENV_API_URL: &str = "LLM_API_URL";
pub const ENV_MODEL: &str = "LLM_MODEL";

/// How streamed answer chunks are stitched into the stored assistant message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkJoin {
    /// Single space between chunks. Replays the transcript exactly as
    /// earlier releases recorded it, spurious spaces included.
    #[default]
    Space,
    Concat,
}

impl ChunkJoin {
    pub fn join(self, chunks: &[String]) -> String {
        match self {
            Self::Space => chunks.join(" "),
            Self::Concat => chunks.concat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_iterations: usize,
    pub chunk_join: ChunkJoin,
    pub connect_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,
    pub exit_on_turn_error: bool,
    pub workspace_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            chunk_join: ChunkJoin::default(),
            connect_timeout_secs: 30,
            turn_timeout_secs: None,
            exit_on_turn_error: false,
            workspace_dir: PathBuf::from("."),
        }
    }
}

pub fn get_chatloop_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CHATLOOP_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_chatloop_dir().join("config.toml")
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

impl Config {
    /// Loads `~/.chatloop/config.toml`, writing the defaults there on first
    /// run, then applies `LLM_*` environment overrides.
    pub fn load_or_init() -> Result<Self> {
        let mut config = if config_exists() {
            load_config()?
        } else {
            let config = Config::default();
            if let Err(e) = save_config(&config) {
                tracing::warn!("Could not write default config: {:#}", e);
            }
            config
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Environment overrides. An empty `LLM_API_KEY` clears the key; empty
    /// URL or model values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()).into());
        }
        if self.api_url.trim().is_empty() {
            return Err(AgentError::Config("api_url must not be empty".into()).into());
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::Config("model must not be empty".into()).into());
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    Config::from_toml(&content)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    let dir = get_chatloop_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory at {}", dir.display()))?;

    let config_path = get_config_path();
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}
