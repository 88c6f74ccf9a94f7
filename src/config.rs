//! Configuration for bioagent
//!
//! Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults (the values the system was tuned with)
//! 2. An optional config file (`bioagent.toml` / `.yaml` in the working
//!    directory, or the path passed with `--config`)
//! 3. Environment variables prefixed `BIOAGENT__`, with `__` separating
//!    nesting levels, e.g. `BIOAGENT__MODEL__BASE_URL=http://gpu-box:8000/v1`
//!
//! A `.env` file is loaded into the environment before step 3.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::launch::VllmServerConfig;
use crate::llm::SamplingParams;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BIOAGENT";

/// Default config file stem looked up in the working directory
const DEFAULT_CONFIG_STEM: &str = "bioagent";

/// Temperature substituted when greedy decoding is requested
const MIN_SAMPLING_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model server connection and sampling
    pub model: ModelConfig,
    /// Which tools the agent may call
    pub tools: ToolsConfig,
    /// cBioPortal REST client
    pub cbioportal: CbioportalConfig,
    /// Batch driver input/output
    pub batch: BatchConfig,
    /// vLLM container launch flags
    pub server: VllmServerConfig,
    /// Logging, tracing export and metrics dump
    pub telemetry: TelemetryConfig,
}

/// Connection to the OpenAI-compatible model server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL including the `/v1` suffix
    pub base_url: String,
    /// Bearer token; vLLM accepts anything unless started with `--api-key`
    pub api_key: String,
    /// Served model name. Auto-detected from `/models` when unset.
    pub model: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Max tokens per agent turn
    pub max_tokens: u32,
    /// Max tokens per question in direct (non-agent) mode
    pub direct_max_tokens: u32,
    /// Per-question timeout for a whole agent run
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Cap on simultaneous in-flight agent runs
    pub max_concurrency: usize,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
    /// Max model calls per question
    pub max_turns: usize,
    /// Overrides the built-in agent system prompt
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model: None,
            temperature: 0.6,
            top_p: 0.95,
            top_k: 20,
            presence_penalty: 1.0,
            frequency_penalty: 0.0,
            max_tokens: 4096,
            direct_max_tokens: 2048,
            request_timeout_secs: 400,
            connect_timeout_secs: 10,
            max_concurrency: 80,
            pool_max_idle_per_host: 100,
            pool_idle_timeout_secs: 30,
            max_turns: 10,
            system_prompt: None,
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    /// Sampling parameters for agent turns.
    ///
    /// Greedy decoding (temperature 0) is replaced with a low non-zero
    /// temperature; the served Qwen models loop under greedy decoding.
    pub fn sampling(&self) -> SamplingParams {
        self.sampling_with_max_tokens(self.max_tokens)
    }

    /// Sampling parameters for direct completion mode
    pub fn direct_sampling(&self) -> SamplingParams {
        self.sampling_with_max_tokens(self.direct_max_tokens)
    }

    fn sampling_with_max_tokens(&self, max_tokens: u32) -> SamplingParams {
        let temperature = if self.temperature == 0.0 {
            warn!(
                substitute = MIN_SAMPLING_TEMPERATURE,
                "temperature=0 (greedy decoding) not recommended for the served model"
            );
            MIN_SAMPLING_TEMPERATURE
        } else {
            self.temperature
        };

        SamplingParams {
            temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            max_tokens,
        }
    }
}

/// Tool switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub enable_cbioportal: bool,
    pub enable_protein_expression: bool,
    pub enable_biorxiv: bool,
    /// Web search endpoint backing the bioRxiv tool
    pub search_url: String,
    pub biorxiv_max_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_cbioportal: true,
            enable_protein_expression: true,
            enable_biorxiv: false,
            search_url: "https://api.duckduckgo.com/".to_string(),
            biorxiv_max_results: 5,
        }
    }
}

/// cBioPortal REST client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CbioportalConfig {
    pub base_url: String,
    /// Studies aggregated per search, largest first
    pub max_studies: usize,
    /// Page size for the study keyword search
    pub study_page_size: usize,
    pub pool_max_idle_per_host: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for CbioportalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.cbioportal.org/api".to_string(),
            max_studies: 5,
            study_page_size: 20,
            pool_max_idle_per_host: 150,
            max_retries: 3,
            retry_backoff_ms: 250,
            request_timeout_secs: 60,
        }
    }
}

impl CbioportalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Batch driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Questions per batch
    pub batch_size: usize,
    /// Agent loop with tools (true) or one direct completion per question
    pub use_agent: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/hackathon-test.jsonl"),
            output: PathBuf::from("result/test_answers.jsonl"),
            batch_size: 32,
            use_agent: true,
        }
    }
}

/// Logging and observability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset
    pub log_filter: String,
    /// OTLP collector endpoint; tracing export is off when unset
    pub otlp_endpoint: Option<String>,
    /// Where to write the Prometheus text dump at the end of a run
    pub metrics_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,bioagent=debug".to_string(),
            otlp_endpoint: None,
            metrics_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is the normal case
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(config::File::from(p).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_STEM).required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("model.base_url must not be empty"));
        }
        if self.cbioportal.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("cbioportal.base_url must not be empty"));
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::invalid("batch.batch_size must be at least 1"));
        }
        if self.model.max_concurrency == 0 {
            return Err(ConfigError::invalid("model.max_concurrency must be at least 1"));
        }
        if self.model.max_turns == 0 {
            return Err(ConfigError::invalid("model.max_turns must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::invalid(format!(
                "model.temperature must be within [0, 2], got {}",
                self.model.temperature
            )));
        }
        if self.cbioportal.max_studies == 0 {
            return Err(ConfigError::invalid("cbioportal.max_studies must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.max_concurrency, 80);
        assert_eq!(config.batch.batch_size, 32);
        assert!(config.tools.enable_cbioportal);
        assert!(!config.tools.enable_biorxiv);
    }

    #[test]
    fn test_validation_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_temperature() {
        let mut config = AppConfig::default();
        config.model.temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_greedy_temperature_is_raised() {
        let mut config = AppConfig::default();
        config.model.temperature = 0.0;
        let sampling = config.model.sampling();
        assert!((sampling.temperature - MIN_SAMPLING_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(sampling.max_tokens, 4096);
        assert_eq!(config.model.direct_sampling().max_tokens, 2048);
    }

    #[test]
    #[serial]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[model]\nbase_url = \"http://file-host:9000/v1\"\nmax_concurrency = 8\n\n[batch]\nbatch_size = 4"
        )
        .unwrap();

        std::env::set_var("BIOAGENT__MODEL__MAX_CONCURRENCY", "16");
        let config = AppConfig::load(Some(file.path()));
        std::env::remove_var("BIOAGENT__MODEL__MAX_CONCURRENCY");

        let config = config.unwrap();
        assert_eq!(config.model.base_url, "http://file-host:9000/v1");
        assert_eq!(config.model.max_concurrency, 16);
        assert_eq!(config.batch.batch_size, 4);
        // Untouched sections keep their defaults
        assert_eq!(config.cbioportal.max_studies, 5);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_fails_validation() {
        std::env::set_var("BIOAGENT__BATCH__BATCH_SIZE", "0");
        let result = AppConfig::load(None);
        std::env::remove_var("BIOAGENT__BATCH__BATCH_SIZE");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
