//! Configuration management
//!
//! This module handles loading, validation, and management of the Muse
//! configuration. Configuration is stored in TOML format at
//! ~/.muse/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **llm**: Generation service settings (base URL, models, temperatures)
//! - **brand**: The brand profile rendered into stage role instructions
//! - **session**: Session token budget
//! - **pipeline**: Retrieval sample sizes and review attempt bounds
//!
//! # Path Expansion
//!
//! The configuration system automatically expands `~` to the user's home
//! directory and creates the data directory if it doesn't exist.
//!
//! # Credentials
//!
//! The API key is never stored in the config file. It is read from the
//! environment variable named by `llm.api_key_env` at client construction
//! time.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Represents the complete Muse configuration loaded from
/// ~/.muse/config.toml. Missing sections fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Generation service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Brand profile
    #[serde(default)]
    pub brand: BrandConfig,

    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used by all stages
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model used by the brand memory
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for most stages
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Higher temperature used for wildcard-angle generation
    #[serde(default = "default_wildcard_temperature")]
    pub wildcard_temperature: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Brand profile rendered into stage role instructions
///
/// The engine treats these as opaque copy: they parameterize the prompts but
/// no code branches on their content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    /// Brand name
    #[serde(default = "default_brand_name")]
    pub name: String,

    /// One-paragraph summary of what the brand does and for whom
    #[serde(default = "default_brand_summary")]
    pub summary: String,

    /// Short description of the target audience
    #[serde(default = "default_brand_audience")]
    pub audience: String,

    /// Website the call-to-action points at
    #[serde(default)]
    pub site_url: String,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token budget per session; crossing it requires an explicit decision
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of recent posts sampled when building brand context
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Number of records returned by semantic context lookups
    #[serde(default = "default_context_results")]
    pub context_results: usize,

    /// Maximum generate/evaluate attempts in the review loop
    #[serde(default = "default_max_review_attempts")]
    pub max_review_attempts: usize,

    /// Default number of content image prompts (the CTA slide is extra)
    #[serde(default = "default_image_prompts")]
    pub default_image_prompts: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.muse")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_wildcard_temperature() -> f64 {
    1.1
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_brand_name() -> String {
    "Muse".to_string()
}

fn default_brand_summary() -> String {
    "A studio brand helping independent makers run their creative business."
        .to_string()
}

fn default_brand_audience() -> String {
    "Independent makers and small creative businesses".to_string()
}

fn default_token_limit() -> usize {
    8000
}

fn default_sample_size() -> usize {
    10
}

fn default_context_results() -> usize {
    5
}

fn default_max_review_attempts() -> usize {
    2
}

fn default_image_prompts() -> usize {
    3
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            wildcard_temperature: default_wildcard_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            name: default_brand_name(),
            summary: default_brand_summary(),
            audience: default_brand_audience(),
            site_url: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            context_results: default_context_results(),
            max_review_attempts: default_max_review_attempts(),
            default_image_prompts: default_image_prompts(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LlmConfig::default(),
            brand: BrandConfig::default(),
            session: SessionConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration file path: ~/.muse/config.toml
    pub fn default_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".muse").join("config.toml"))
    }

    /// Load configuration from the default location, creating it with
    /// defaults on first run.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let path = Self::default_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save_to_path(&path)?;
            tracing::info!("Created default configuration at {}", path.display());
            return config.validated();
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Invalid TOML: {}", e)))?;

        config.validated()
    }

    /// Write the configuration to the given path, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Expand ~, verify values, and ensure the data directory exists
    fn validated(mut self) -> Result<Self, EngineError> {
        self.core.data_dir = expand_tilde(&self.core.data_dir)?;
        fs::create_dir_all(&self.core.data_dir)?;

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(EngineError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.session.token_limit == 0 {
            return Err(EngineError::Config(
                "session.token_limit must be greater than zero".to_string(),
            ));
        }

        if self.pipeline.max_review_attempts == 0 {
            return Err(EngineError::Config(
                "pipeline.max_review_attempts must be greater than zero".to_string(),
            ));
        }

        Ok(self)
    }

    /// Path of the SQLite database holding brand memory and sessions
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("muse.db")
    }

    /// Path of the active-session pointer file
    pub fn session_pointer_path(&self) -> PathBuf {
        self.core.data_dir.join("active_session")
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, EngineError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| EngineError::MissingCredentials(self.llm.api_key_env.clone()))
    }
}

/// Expand a leading ~ to the user's home directory
fn expand_tilde(path: &Path) -> Result<PathBuf, EngineError> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        let rest = rest.trim_start_matches('/');
        Ok(home.join(rest))
    } else {
        Ok(path.to_path_buf())
    }
}
