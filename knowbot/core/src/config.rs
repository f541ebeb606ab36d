//! TOML Configuration File Support
//!
//! Centralized configuration loading for knowbot, supporting a TOML file at
//! `~/.config/knowbot/knowbot.toml`. The result is built once at startup,
//! wrapped in an `Arc`, and never mutated afterwards.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [service]
//! endpoint = "http://localhost:3000/api/chat"
//! connect_timeout_secs = 10
//! read_timeout_secs = 120
//!
//! [completion]
//! embedding_model = "text-embedding-ada-002"
//! completion_model = "gpt-3.5-turbo"
//! namespace = "my-namespace"
//! prompt_template = "Context: {CONTEXT}\n\nQuestion: {QUERY}\n\nAnswer: "
//!
//! [ui]
//! title = "Knowledge Bot"
//! suggestions = ["How do I install it?", "How can I use it?"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{CompletionConfig, CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER};

/// Endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat";

/// Default time allowed to establish a connection, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default longest silence between body chunks, in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and supportive expert.
Answer the questions faithfully
Use Markdown when necessary and
Try to include a code example in language-specific fenced code blocks, especially if it's provided in the context.
If the answer is not provided in the context, say \"Sorry, I don't have that information.\".";

const DEFAULT_PROMPT_TEMPLATE: &str = "Context: {CONTEXT}\n\nQuestion: {QUERY}\n\nAnswer: ";

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

/// Tracks where the effective configuration came from
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

/// `[service]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Completion service URL
    pub endpoint: Option<String>,

    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Longest silence between body chunks, in seconds
    pub read_timeout_secs: Option<u64>,
}

/// `[completion]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionToml {
    /// Embedding model name
    pub embedding_model: Option<String>,

    /// Completion model name
    pub completion_model: Option<String>,

    /// Vector index namespace
    pub namespace: Option<String>,

    /// System prompt
    pub system_prompt: Option<String>,

    /// Prompt template with `{CONTEXT}` and `{QUERY}`
    pub prompt_template: Option<String>,
}

/// `[ui]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiToml {
    /// Window / banner title
    pub title: Option<String>,

    /// Canned starter questions
    pub suggestions: Option<Vec<String>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowbotToml {
    /// Service section
    pub service: ServiceToml,

    /// Completion section
    pub completion: CompletionToml,

    /// UI section
    pub ui: UiToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Where and how to reach the completion service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Completion service URL
    pub endpoint: String,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Longest silence between body chunks
    ///
    /// There is no deadline on the whole exchange; an answer may stream for
    /// as long as the service keeps sending.
    pub read_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

/// Presentation settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiConfig {
    /// Title shown by the surface
    pub title: String,
    /// Canned starter questions
    pub suggestions: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Knowledge Bot".to_string(),
            suggestions: vec![
                "How do I install it?".to_string(),
                "How can I use it?".to_string(),
                "Do you have any examples?".to_string(),
            ],
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-ada-002".to_string(),
            completion_model: "gpt-3.5-turbo".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            namespace: "my-namespace".to_string(),
        }
    }
}

/// Effective application configuration
///
/// Use [`load_config`] to build one with proper priority handling, then
/// [`AppConfig::validate`] before handing it to a session.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Service connection
    pub service: ServiceConfig,

    /// Settings forwarded with every request
    pub completion: CompletionConfig,

    /// Presentation
    pub ui: UiConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            completion: CompletionConfig::default(),
            ui: UiConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority source that contributed to this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would otherwise fail at request time
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the endpoint is not an http(s) URL, the
    /// prompt template lacks a placeholder, or a model name is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.service.endpoint).map_err(|e| {
            ConfigError::ValidationError(format!(
                "endpoint '{}' is not a valid URL: {e}",
                self.service.endpoint
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "endpoint scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }

        for placeholder in [CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER] {
            if !self.completion.prompt_template.contains(placeholder) {
                return Err(ConfigError::ValidationError(format!(
                    "prompt_template must contain {placeholder}"
                )));
            }
        }

        if self.completion.embedding_model.trim().is_empty()
            || self.completion.completion_model.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "model names must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/knowbot/knowbot.toml` or
/// `~/.config/knowbot/knowbot.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("knowbot").join("knowbot.toml"))
}

/// Load configuration from the default path, environment, and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, resolving environment variables through `lookup`
fn load_config_with_env(
    path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: KnowbotToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
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

    apply_env_config(&mut config, lookup);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AppConfig, toml: KnowbotToml) {
    if let Some(endpoint) = toml.service.endpoint {
        config.service.endpoint = endpoint;
    }
    if let Some(secs) = toml.service.connect_timeout_secs {
        config.service.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.service.read_timeout_secs {
        config.service.read_timeout = Duration::from_secs(secs);
    }

    let completion = &mut config.completion;
    if let Some(model) = toml.completion.embedding_model {
        completion.embedding_model = model;
    }
    if let Some(model) = toml.completion.completion_model {
        completion.completion_model = model;
    }
    if let Some(namespace) = toml.completion.namespace {
        completion.namespace = namespace;
    }
    if let Some(prompt) = toml.completion.system_prompt {
        completion.system_prompt = prompt;
    }
    if let Some(template) = toml.completion.prompt_template {
        completion.prompt_template = template;
    }

    if let Some(title) = toml.ui.title {
        config.ui.title = title;
    }
    if let Some(suggestions) = toml.ui.suggestions {
        config.ui.suggestions = suggestions;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = lookup("KNOWBOT_ENDPOINT") {
        config.service.endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup("KNOWBOT_TIMEOUT") {
        match timeout.parse::<u64>() {
            Ok(secs) => {
                config.service.read_timeout = Duration::from_secs(secs);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %timeout, "Ignoring non-numeric KNOWBOT_TIMEOUT"),
        }
    }
    if let Some(model) = lookup("KNOWBOT_EMBEDDING_MODEL") {
        config.completion.embedding_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = lookup("KNOWBOT_COMPLETION_MODEL") {
        config.completion.completion_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(namespace) = lookup("KNOWBOT_NAMESPACE") {
        config.completion.namespace = namespace;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint override
    pub endpoint: Option<String>,

    /// Completion model override
    pub completion_model: Option<String>,

    /// Namespace override
    pub namespace: Option<String>,

    /// Read timeout override (seconds)
    pub read_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set completion model override
    #[must_use]
    pub fn with_completion_model(mut self, model: String) -> Self {
        self.completion_model = Some(model);
        self
    }

    /// Set namespace override
    #[must_use]
    pub fn with_namespace(mut self, namespace: String) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Set read timeout override
    #[must_use]
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = Some(secs);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.completion_model.is_none()
            && self.namespace.is_none()
            && self.read_timeout_secs.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if self.is_empty() {
            return;
        }

        if let Some(ref endpoint) = self.endpoint {
            config.service.endpoint.clone_from(endpoint);
        }
        if let Some(ref model) = self.completion_model {
            config.completion.completion_model.clone_from(model);
        }
        if let Some(ref namespace) = self.namespace {
            config.completion.namespace.clone_from(namespace);
        }
        if let Some(secs) = self.read_timeout_secs {
            config.service.read_timeout = Duration::from_secs(secs);
        }
        config.source = ConfigSource::Cli;
    }
}
