//! Configuration models for halluval.
//!
//! Every field has a default, so an empty file is a valid configuration that
//! talks to the OpenAI API with `gpt-4o-mini` for both generation and judging.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level configuration for halluval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text-generation endpoint (OpenAI-compatible)
    pub endpoint: EndpointConfig,

    /// Model used to produce hallucinated and partial answers
    pub generator: ModelSpec,

    /// Model used as the judge
    pub judge: ModelSpec,

    /// Variant generation settings
    pub generation: GenerationConfig,

    /// Judge call settings
    pub judging: JudgingConfig,

    /// Batch execution settings
    pub pipeline: PipelineConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// API key; `${VAR}` placeholders are expanded
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL (e.g. "http://localhost:11434/v1" for a local server)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Extra request headers; values may contain `${VAR}`
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request. 1 means fail fast without retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    1
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Specification for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model ID as the endpoint knows it (e.g. "gpt-4o-mini", "llama3.3:70b")
    #[serde(default = "default_model_id")]
    pub id: String,

    /// Human-readable label
    #[serde(default)]
    pub label: Option<String>,

    /// Input price per 1M tokens (USD), 0 for local models
    #[serde(default)]
    pub input_price_per_1m: f64,

    /// Output price per 1M tokens (USD), 0 for local models
    #[serde(default)]
    pub output_price_per_1m: f64,
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            label: None,
            input_price_per_1m: 0.0,
            output_price_per_1m: 0.0,
        }
    }
}

impl ModelSpec {
    /// Model spec with the given id and no pricing.
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Estimated cost of a call in USD.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_price_per_1m;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_price_per_1m;
        input_cost + output_cost
    }
}

/// Variant generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature for the hallucinated answer (kept near maximum)
    #[serde(default = "default_hallucination_temperature")]
    pub hallucination_temperature: f64,

    /// Sampling temperature for the partial answer
    #[serde(default = "default_partial_temperature")]
    pub partial_temperature: f64,

    /// Output cap for generated answers
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,
}

fn default_hallucination_temperature() -> f64 {
    1.0
}

fn default_partial_temperature() -> f64 {
    0.7
}

fn default_generation_max_tokens() -> u32 {
    200
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            hallucination_temperature: default_hallucination_temperature(),
            partial_temperature: default_partial_temperature(),
            max_tokens: default_generation_max_tokens(),
        }
    }
}

/// Judge call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgingConfig {
    /// Judge temperature; 0 keeps verdicts deterministic
    #[serde(default)]
    pub temperature: f64,

    /// Output cap, large enough for step-by-step reasoning
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
}

fn default_judge_max_tokens() -> u32 {
    500
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: default_judge_max_tokens(),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Examples processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Abort the whole batch run on the first failed example
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fail_fast: false,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Whether to report token usage and cost
    #[serde(default = "default_true")]
    pub track_costs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { track_costs: true }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the API key from config or environment.
    ///
    /// A missing key is only an error when `required` is set; local servers
    /// usually run without authentication.
    pub fn resolve_api_key(&self, required: bool) -> Result<Option<String>, ConfigError> {
        if let Some(key) = &self.endpoint.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        match std::env::var(&self.endpoint.api_key_env) {
            Ok(key) => Ok(Some(key)),
            Err(_) if required => Err(ConfigError::MissingApiKey {
                env_var: self.endpoint.api_key_env.clone(),
            }),
            Err(_) => Ok(None),
        }
    }

    /// Request headers with environment variables expanded.
    pub fn resolved_headers(&self) -> HashMap<String, String> {
        expand_headers(&self.endpoint.headers)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temperatures = [
            (
                "generation.hallucination_temperature",
                self.generation.hallucination_temperature,
            ),
            (
                "generation.partial_temperature",
                self.generation.partial_temperature,
            ),
            ("judging.temperature", self.judging.temperature),
        ];
        for (field, value) in temperatures {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is outside 0.0..=2.0"),
                });
            }
        }

        let positives = [
            ("generation.max_tokens", self.generation.max_tokens as usize),
            ("judging.max_tokens", self.judging.max_tokens as usize),
            ("pipeline.concurrency", self.pipeline.concurrency),
            ("endpoint.max_retries", self.endpoint.max_retries as usize),
            ("endpoint.timeout_secs", self.endpoint.timeout_secs as usize),
        ];
        for (field, value) in positives {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        for (field, model) in [("generator.id", &self.generator), ("judge.id", &self.judge)] {
            if model.id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    ENV_VAR_RE
        .replace_all(s, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand environment variables in all headers.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or endpoint.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
