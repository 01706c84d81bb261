//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every section has defaults, so an empty file is
//! a valid configuration. Durations are written the humantime way
//! (`30s`, `500ms`, `1h`).
//!
//! ```yaml
//! judge:
//!   model: qwen-max
//!   timeout: 30s
//! retry:
//!   max_retries: 3
//! batch:
//!   concurrency: 5
//! on_judge_failure: skip_rule
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::providers::{CompletionConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
use crate::resilience::{CircuitBreakerConfig, FallbackStrategy, JudgeFailurePolicy, RetryPolicy};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter for humantime durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// An LLM endpoint and the request settings used against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Registered provider type
    pub provider: String,

    pub model: String,

    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub max_tokens: u32,

    pub temperature: f32,

    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl ModelConfig {
    /// Judge defaults: a deterministic one-token answer.
    pub fn judge() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "qwen-max".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_tokens: 10,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }

    /// Reply generator defaults for golden-history mode.
    pub fn generator() -> Self {
        Self {
            model: "qwen-plus".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            ..Self::judge()
        }
    }

    /// JSON handed to the provider factory.
    pub fn provider_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": self.base_url,
            "api_key_env": self.api_key_env,
        })
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::judge()
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Conversations evaluated at once
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub judge: ModelConfig,

    pub generator: ModelConfig,

    pub retry: RetryPolicy,

    pub circuit_breaker: CircuitBreakerConfig,

    pub cache: CacheConfig,

    pub batch: BatchConfig,

    pub on_judge_failure: JudgeFailurePolicy,

    pub precondition_fallback: FallbackStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            judge: ModelConfig::judge(),
            generator: ModelConfig::generator(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            on_judge_failure: JudgeFailurePolicy::default(),
            precondition_fallback: FallbackStrategy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (section, model) in [("judge", &self.judge), ("generator", &self.generator)] {
            if model.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}.model must not be empty", section)));
            }
            if model.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!("{}.max_tokens must be positive", section)));
            }
            if model.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!("{}.timeout must be positive", section)));
            }
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::Invalid("batch.concurrency must be at least 1".to_string()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
