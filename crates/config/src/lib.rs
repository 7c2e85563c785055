//! Configuration loading, validation, and management for Augur.
//!
//! Loads configuration from `~/.augur/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.augur/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the Messages API base URL (proxies, testing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Replace the built-in system instructions entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub markets: MarketsConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("agent", &self.agent)
            .field("retry", &self.retry)
            .field("tools", &self.tools)
            .field("markets", &self.markets)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model calls allowed per turn before the loop gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Throttling back-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Fixed pause before re-issuing a throttled call
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Retries after the first attempt; 0 disables retrying
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_cooldown_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// First words a shell command may start with. Empty = anything.
    #[serde(default = "default_shell_allowed_commands")]
    pub shell_allowed_commands: Vec<String>,

    /// Hard wall-clock limit for one shell command
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,

    /// Root that relative file paths resolve against; file tools stay inside it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Path prefixes the file tools refuse to touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_shell_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep", "curl", "git"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_shell_timeout_secs() -> u64 {
    30
}
fn default_forbidden_paths() -> Vec<String> {
    ["/etc", "/proc", "/sys", "~/.ssh", "~/.gnupg", "~/.aws", "~/.augur"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_allowed_commands: default_shell_allowed_commands(),
            shell_timeout_secs: default_shell_timeout_secs(),
            workspace_root: None,
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketsConfig {
    /// Label of the network markets are created on (shown by `/config`)
    #[serde(default = "default_network")]
    pub network: String,

    /// Duration used by `/create` when none is given
    #[serde(default = "default_duration_days")]
    pub default_duration_days: u32,

    /// Initial liquidity used by `/create` when none is given
    #[serde(default = "default_liquidity_usdc")]
    pub default_liquidity_usdc: f64,
}

fn default_network() -> String {
    "paper".into()
}
fn default_duration_days() -> u32 {
    30
}
fn default_liquidity_usdc() -> f64 {
    1.0
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            default_duration_days: default_duration_days(),
            default_liquidity_usdc: default_liquidity_usdc(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, then apply environment overrides:
    /// - `AUGUR_API_KEY`, then `ANTHROPIC_API_KEY` (only if no key is set)
    /// - `AUGUR_MODEL`
    /// - `AUGUR_API_URL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("AUGUR_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .filter(|k| !k.trim().is_empty());
        }

        if let Ok(model) = std::env::var("AUGUR_MODEL") {
            config.model = model;
        }

        if let Ok(url) = std::env::var("AUGUR_API_URL") {
            config.api_url = Some(url);
        }

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

    /// `~/.augur/config.toml`.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".augur")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.retry.max_attempts > 20 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at most 20".into(),
            ));
        }

        if self.tools.shell_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.shell_timeout_secs must be > 0".into(),
            ));
        }

        if self.markets.default_liquidity_usdc <= 0.0 || self.markets.default_duration_days == 0 {
            return Err(ConfigError::ValidationError(
                "markets defaults must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Render the effective configuration as TOML with the key redacted.
    pub fn redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.api_key.is_some() {
            shown.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            tools: ToolsConfig::default(),
            markets: MarketsConfig::default(),
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
