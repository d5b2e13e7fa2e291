//! Configuration management
//!
//! This module handles loading, validation, and management of the CoE configuration.
//! Configuration is stored in TOML format at ~/.coe/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, run log directory
//! - **llm**: Text-generation provider settings
//! - **retry**: Attempt budget, backoff and per-call timeout applied to every generation call
//! - **session**: Collaboration and reflection budgets, conductor policy, model override
//! - **evaluator**: Fixture interpreter, timeout and numeric tolerance
//!
//! # Examples
//!
//! ```no_run
//! use coe_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Runs: {:?}", config.core.runs_dir);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Text-generation provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Retry policy for generation calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Trial loop budgets
    #[serde(default)]
    pub session: SessionConfig,

    /// Fixture execution
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory receiving run logs (supports ~ expansion)
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

/// Text-generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LLMConfig {
    /// Provider used for every call (openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAIConfig {
    /// Base URL for the API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature; experts expect deterministic output
    #[serde(default)]
    pub temperature: f32,
    // Note: API key comes from OPENAI_API_KEY or the OS keychain, never from config
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Attempts per generation call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles afterwards
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Timeout applied to each attempt
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

/// Conductor policy selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConductorKind {
    /// Fixed declaration order
    RoundRobin,
    /// Ask the model which expert is needed next
    Generative,
}

/// Trial loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Forward-pass expert budget per trial
    #[serde(default = "default_max_collaborate_nums")]
    pub max_collaborate_nums: usize,

    /// Maximum number of trials, reflection included
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,

    /// Whether EVALUATING and REFLECTING are entered at all
    #[serde(default = "default_true")]
    pub enable_reflection: bool,

    /// Expert selection policy
    #[serde(default = "default_conductor")]
    pub conductor: ConductorKind,

    /// Allow the same expert more than once per forward pass
    #[serde(default)]
    pub allow_repeat_experts: bool,

    /// Overrides the provider's model for this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatorConfig {
    /// Interpreter used to execute generated programs
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Timeout per fixture execution
    #[serde(default = "default_fixture_timeout")]
    pub timeout_secs: u64,

    /// Numeric tolerance when the problem does not declare one
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Ask the model for fixtures when the store supplies none
    #[serde(default = "default_true")]
    pub generate_missing_fixtures: bool,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("~/.coe/runs")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_max_collaborate_nums() -> usize {
    5
}

fn default_max_trials() -> usize {
    3
}

fn default_conductor() -> ConductorKind {
    ConductorKind::Generative
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_fixture_timeout() -> u64 {
    60
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            runs_dir: default_runs_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: 0.0,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl RetryConfig {
    /// Build the runtime policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_collaborate_nums: default_max_collaborate_nums(),
            max_trials: default_max_trials(),
            enable_reflection: true,
            conductor: default_conductor(),
            allow_repeat_experts: false,
            model: None,
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_fixture_timeout(),
            tolerance: default_tolerance(),
            generate_missing_fixtures: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.coe/config.toml)
    ///
    /// If the configuration file doesn't exist, writes a default one first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let default = Self::default();
        let toml_string = toml::to_string_pretty(&default)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = default;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.coe/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".coe").join("config.toml"))
    }

    /// Model the session should target, after the per-session override
    pub fn effective_model(&self) -> String {
        if let Some(model) = &self.session.model {
            return model.clone();
        }
        match self.llm.default_provider.as_str() {
            "ollama" => self.llm.ollama.model.clone(),
            _ => self.llm.openai.model.clone(),
        }
    }

    /// Validate and process configuration
    ///
    /// Checks enumerated values and budgets, then expands ~ in paths.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.timeout_secs == 0 {
            return Err(EngineError::Config(
                "retry.timeout_secs must be positive".to_string(),
            ));
        }
        if self.session.max_collaborate_nums == 0 {
            return Err(EngineError::Config(
                "session.max_collaborate_nums must be at least 1".to_string(),
            ));
        }
        if self.session.max_trials == 0 {
            return Err(EngineError::Config(
                "session.max_trials must be at least 1".to_string(),
            ));
        }
        if !(self.evaluator.tolerance >= 0.0) {
            return Err(EngineError::Config(
                "evaluator.tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.evaluator.timeout_secs == 0 {
            return Err(EngineError::Config(
                "evaluator.timeout_secs must be positive".to_string(),
            ));
        }

        self.core.runs_dir = expand_path(&self.core.runs_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
