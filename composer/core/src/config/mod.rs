//! TOML Configuration File Support
//!
//! Builds the single [`ComposerConfig`] value that is handed to the composer
//! at construction. There is no global configuration; every request reads
//! the value it was given.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The file lives at `$XDG_CONFIG_HOME/reasoning-composer/composer.toml`
//! (typically `~/.config/reasoning-composer/composer.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! [reasoner]
//! name = "deepseek"
//! dialect = "openai"
//! api_url = "https://api.deepseek.com/v1/chat/completions"
//! api_key = "sk-..."
//! model = "deepseek-reasoner"
//! native_reasoning = true
//! token_budget_enabled = true
//! token_budget_max = 5
//!
//! [responder]
//! name = "claude"
//! dialect = "anthropic"
//! api_url = "https://api.anthropic.com/v1/messages"
//! api_key = "sk-ant-..."
//! model = "claude-3-5-sonnet-20241022"
//!
//! [transport]
//! read_timeout_secs = 120
//! proxy = "http://127.0.0.1:7890"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Dialect, ProviderEndpoint, DEFAULT_READ_TIMEOUT};
use crate::stream::ReasoningPolicy;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// One provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Provider name used in logs
    pub name: Option<String>,

    /// Wire dialect ("openai" or "anthropic")
    pub dialect: Option<Dialect>,

    /// Full endpoint URL
    pub api_url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Provider-side model identifier
    pub model: Option<String>,

    /// Whether the provider returns a structured reasoning field
    pub native_reasoning: Option<bool>,

    /// Whether to bound generated tokens (native reasoning only)
    pub token_budget_enabled: Option<bool>,

    /// Token bound when the budget is enabled
    pub token_budget_max: Option<u32>,
}

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Idle timeout between upstream deliveries, in seconds
    pub read_timeout_secs: Option<u64>,

    /// Proxy URL for all upstream calls
    pub proxy: Option<String>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerToml {
    /// Phase-one (reasoning) provider
    pub reasoner: ProviderToml,

    /// Phase-two (answer) provider
    pub responder: ProviderToml,

    /// Transport settings
    pub transport: TransportToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Everything needed to call one provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider name used in logs
    pub name: String,
    /// Wire dialect
    pub dialect: Dialect,
    /// Full endpoint URL
    pub api_url: String,
    /// API key
    pub api_key: String,
    /// Provider-side model identifier
    pub model: String,
    /// How this provider's stream is classified
    pub policy: ReasoningPolicy,
}

impl ProviderConfig {
    /// DeepSeek reasoner defaults
    #[must_use]
    pub fn default_reasoner() -> Self {
        Self {
            name: "deepseek".to_string(),
            dialect: Dialect::OpenAi,
            api_url: "https://api.deepseek.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "deepseek-reasoner".to_string(),
            policy: ReasoningPolicy::default(),
        }
    }

    /// Claude responder defaults
    #[must_use]
    pub fn default_responder() -> Self {
        Self {
            name: "claude".to_string(),
            dialect: Dialect::Anthropic,
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: String::new(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            policy: ReasoningPolicy::default(),
        }
    }

    /// Endpoint for this provider
    #[must_use]
    pub fn endpoint(&self) -> ProviderEndpoint {
        ProviderEndpoint::new(
            self.name.clone(),
            self.dialect,
            self.api_url.clone(),
            self.api_key.clone(),
        )
    }

    fn validate(&self, role: &str) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{role} api_url is empty"
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{role} api_key is not set"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{role} model is empty"
            )));
        }
        if self.policy.token_budget_enabled && self.policy.token_budget_max == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{role} token_budget_max must be positive"
            )));
        }
        Ok(())
    }
}

/// Resolved composer configuration
#[derive(Clone, Debug)]
pub struct ComposerConfig {
    /// Phase-one (reasoning) provider
    pub reasoner: ProviderConfig,

    /// Phase-two (answer) provider
    pub responder: ProviderConfig,

    /// Idle timeout between upstream deliveries
    pub read_timeout: Duration,

    /// Proxy URL for all upstream calls
    pub proxy: Option<String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            reasoner: ProviderConfig::default_reasoner(),
            responder: ProviderConfig::default_responder(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            proxy: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ComposerConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that both providers are callable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first missing or
    /// invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reasoner.validate("reasoner")?;
        self.responder.validate("responder")?;
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "read timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("reasoning-composer").join("composer.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ComposerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ComposerConfig, ConfigError> {
    let mut config = load_file_config(path)?;
    apply_env_config(&mut config);
    Ok(config)
}

/// Defaults plus the config file, without the environment
fn load_file_config(path: Option<PathBuf>) -> Result<ComposerConfig, ConfigError> {
    let mut config = ComposerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ComposerToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    Ok(config)
}

fn apply_provider_toml(provider: &mut ProviderConfig, toml: &ProviderToml) {
    if let Some(ref name) = toml.name {
        provider.name = name.clone();
    }
    if let Some(dialect) = toml.dialect {
        provider.dialect = dialect;
    }
    if let Some(ref url) = toml.api_url {
        provider.api_url = url.clone();
    }
    if let Some(ref key) = toml.api_key {
        provider.api_key = key.clone();
    }
    if let Some(ref model) = toml.model {
        provider.model = model.clone();
    }
    if let Some(native) = toml.native_reasoning {
        provider.policy.native_reasoning = native;
    }
    if let Some(enabled) = toml.token_budget_enabled {
        provider.policy.token_budget_enabled = enabled;
    }
    if let Some(max) = toml.token_budget_max {
        provider.policy.token_budget_max = max;
    }
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ComposerConfig, toml: &ComposerToml) {
    apply_provider_toml(&mut config.reasoner, &toml.reasoner);
    apply_provider_toml(&mut config.responder, &toml.responder);

    if let Some(secs) = toml.transport.read_timeout_secs {
        config.read_timeout = Duration::from_secs(secs);
    }
    if toml.transport.proxy.is_some() {
        config.proxy = toml.transport.proxy.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ComposerConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true"
}

/// Apply overrides read through `lookup`
fn apply_env_from(config: &mut ComposerConfig, lookup: impl Fn(&str) -> Option<String>) {
    let mut touched = false;
    let mut set = |target: &mut String, key: &str| {
        if let Some(value) = lookup(key) {
            *target = value;
            touched = true;
        }
    };

    // Reasoning provider
    set(&mut config.reasoner.api_key, "DEEPSEEK_API_KEY");
    set(&mut config.reasoner.api_url, "DEEPSEEK_API_URL");
    set(&mut config.reasoner.model, "DEEPSEEK_MODEL");

    // Answer provider
    set(&mut config.responder.api_key, "CLAUDE_API_KEY");
    set(&mut config.responder.api_url, "CLAUDE_API_URL");
    set(&mut config.responder.model, "CLAUDE_MODEL");

    if let Some(native) = lookup("IS_ORIGIN_REASONING") {
        config.reasoner.policy.native_reasoning = parse_flag(&native);
        touched = true;
    }
    if let Some(enabled) = lookup("SAVE_DEEPSEEK_TOKENS") {
        config.reasoner.policy.token_budget_enabled = parse_flag(&enabled);
        touched = true;
    }
    if let Some(max) = lookup("SAVE_DEEPSEEK_TOKENS_MAX_TOKENS") {
        if let Ok(n) = max.parse::<u32>() {
            config.reasoner.policy.token_budget_max = n;
            touched = true;
        }
    }
    if let Some(provider) = lookup("CLAUDE_PROVIDER") {
        match provider.parse::<Dialect>() {
            Ok(dialect) => {
                config.responder.dialect = dialect;
                touched = true;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring CLAUDE_PROVIDER"),
        }
    }

    // Transport settings
    if let Some(timeout) = lookup("COMPOSER_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.read_timeout = Duration::from_secs(secs);
            touched = true;
        }
    }
    if let Some(proxy) = lookup("COMPOSER_PROXY") {
        config.proxy = Some(proxy);
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Reasoner model override
    pub reasoner_model: Option<String>,

    /// Responder model override
    pub responder_model: Option<String>,

    /// Native reasoning override for the reasoner
    pub native_reasoning: Option<bool>,

    /// Idle timeout override (seconds)
    pub read_timeout_secs: Option<u64>,

    /// Proxy override
    pub proxy: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set reasoner model override
    #[must_use]
    pub fn with_reasoner_model(mut self, model: String) -> Self {
        self.reasoner_model = Some(model);
        self
    }

    /// Set responder model override
    #[must_use]
    pub fn with_responder_model(mut self, model: String) -> Self {
        self.responder_model = Some(model);
        self
    }

    /// Set native reasoning override
    #[must_use]
    pub fn with_native_reasoning(mut self, native: bool) -> Self {
        self.native_reasoning = Some(native);
        self
    }

    /// Set idle timeout override
    #[must_use]
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = Some(secs);
        self
    }

    /// Set proxy override
    #[must_use]
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ComposerConfig) {
        if self.reasoner_model.is_some()
            || self.responder_model.is_some()
            || self.native_reasoning.is_some()
            || self.read_timeout_secs.is_some()
            || self.proxy.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.reasoner_model {
            config.reasoner.model = model.clone();
        }
        if let Some(ref model) = self.responder_model {
            config.responder.model = model.clone();
        }
        if let Some(native) = self.native_reasoning {
            config.reasoner.policy.native_reasoning = native;
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(ref proxy) = self.proxy {
            config.proxy = Some(proxy.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
