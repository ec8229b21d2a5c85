//! Configuration management for Confab
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ConfabError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Owner namespace used when no identity is configured
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Main configuration structure for Confab
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Chat behavior configuration
    #[serde(default)]
    pub chat: ChatConfig,
    /// Context window management
    #[serde(default)]
    pub context: ContextConfig,
    /// History browsing and previews
    #[serde(default)]
    pub history: HistoryConfig,
    /// Session storage location
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Provider configuration
///
/// Specifies which completion provider to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Anthropic configuration
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

fn default_provider_type() -> String {
    "anthropic".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

/// Anthropic Messages API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API base URL (overridable for tests and proxies)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key; falls back to the `ANTHROPIC_API_KEY` environment variable
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Active model
    #[serde(default = "default_model")]
    pub model: String,

    /// Models offered for selection
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// HTTP timeout for a single request, including a full streamed reply
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "claude-sonnet-4-20250514".to_string(),
        "claude-3-7-sonnet-20250219".to_string(),
        "claude-opus-4-20250514".to_string(),
        "claude-3-opus-20240229".to_string(),
    ]
}

fn default_timeout_seconds() -> u64 {
    600
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            models: default_models(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Chat behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Owner namespace for stored sessions
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Sampling temperature (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens per reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// System instruction sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_owner() -> String {
    ANONYMOUS_OWNER.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    64_000
}

fn default_system_prompt() -> String {
    "Be concise.".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Context window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Input token budget; older turns are dropped beyond it
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

fn default_max_input_tokens() -> usize {
    40_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: default_max_input_tokens(),
        }
    }
}

/// History browsing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of recent sessions to list
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// User turns required before a title is generated
    #[serde(default = "default_preview_min_user_turns")]
    pub preview_min_user_turns: usize,

    /// Characters of the first user message used as a fallback preview
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Characters of a preview shown in menu labels
    #[serde(default = "default_label_chars")]
    pub label_chars: usize,
}

fn default_recent_limit() -> usize {
    10
}

fn default_preview_min_user_turns() -> usize {
    2
}

fn default_excerpt_chars() -> usize {
    30
}

fn default_label_chars() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            preview_min_user_turns: default_preview_min_user_turns(),
            excerpt_chars: default_excerpt_chars(),
            label_chars: default_label_chars(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfabError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ConfabError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(model) = std::env::var("CONFAB_MODEL") {
            self.provider.anthropic.model = model;
        }

        if let Ok(api_base) = std::env::var("CONFAB_API_BASE") {
            self.provider.anthropic.api_base = api_base;
        }

        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            if self.provider.anthropic.api_key.is_none() {
                self.provider.anthropic.api_key = Some(api_key);
            }
        }

        if let Ok(owner) = std::env::var("CONFAB_OWNER") {
            self.chat.owner = owner;
        }

        if let Ok(budget) = std::env::var("CONFAB_MAX_INPUT_TOKENS") {
            if let Ok(value) = budget.parse() {
                self.context.max_input_tokens = value;
            } else {
                tracing::warn!("Invalid CONFAB_MAX_INPUT_TOKENS: {}", budget);
            }
        }

        if let Ok(temperature) = std::env::var("CONFAB_TEMPERATURE") {
            if let Ok(value) = temperature.parse() {
                self.chat.temperature = value;
            } else {
                tracing::warn!("Invalid CONFAB_TEMPERATURE: {}", temperature);
            }
        }

        if let Ok(db_path) = std::env::var("CONFAB_HISTORY_DB") {
            self.storage.path = Some(db_path);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let valid_providers = ["anthropic"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(ConfabError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.provider.anthropic.model.trim().is_empty() {
            return Err(ConfabError::Config("provider model cannot be empty".to_string()).into());
        }

        if self.provider.anthropic.timeout_seconds == 0 {
            return Err(ConfabError::Config(
                "provider timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.chat.temperature) {
            return Err(ConfabError::Config(
                "chat.temperature must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if self.chat.max_output_tokens == 0 {
            return Err(ConfabError::Config(
                "chat.max_output_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.context.max_input_tokens == 0 {
            return Err(ConfabError::Config(
                "context.max_input_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.recent_limit == 0 {
            return Err(ConfabError::Config(
                "history.recent_limit must be greater than 0".to_string(),
            )
            .into());
        }

        if self.history.excerpt_chars == 0 || self.history.label_chars == 0 {
            return Err(ConfabError::Config(
                "history preview lengths must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

/// Normalize an owner id to its storage key
///
/// # Errors
///
/// Returns `ConfabError::Identity` when the owner is blank.
///
/// # Examples
///
/// ```
/// use confab::config::normalize_owner;
///
/// assert_eq!(normalize_owner("  Ada@Example.COM ").unwrap(), "ada@example.com");
/// assert!(normalize_owner("   ").is_err());
/// ```
pub fn normalize_owner(owner: &str) -> Result<String> {
    let normalized = owner.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ConfabError::Identity("owner id cannot be empty".to_string()).into());
    }
    Ok(normalized)
}
