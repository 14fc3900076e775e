//! marketagent configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main marketagent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Relational store configuration
    pub store: StoreConfig,

    /// Worker and supervisor retry budgets
    pub agents: AgentsConfig,

    /// Receipt conversion
    pub receipts: ReceiptsConfig,

    /// Wall-clock deadline for one top-level invocation
    #[serde(rename = "deadline-ms", skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,

    /// Log level used when --log-level is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the LLM API key environment variable is set.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .marketagent.yml
        let local_config = PathBuf::from(".marketagent.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/marketagent/marketagent.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("marketagent").join("marketagent.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Deadline for one invocation, if configured
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
            temperature: 0.1,
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: spendstore::default_db_path(),
        }
    }
}

/// Retry budgets and limits for the agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// SQL retrieval worker attempts
    #[serde(rename = "sql-max-iterations")]
    pub sql_max_iterations: u32,

    /// Report-writing worker attempts
    #[serde(rename = "report-max-iterations")]
    pub report_max_iterations: u32,

    /// Supervisor planning attempts
    #[serde(rename = "supervisor-max-iterations")]
    pub supervisor_max_iterations: u32,

    /// Total graph steps allowed in one report run
    #[serde(rename = "max-steps")]
    pub max_steps: u32,

    /// Row limit hint for single-shot questions
    #[serde(rename = "top-k")]
    pub top_k: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            sql_max_iterations: 2,
            report_max_iterations: 2,
            supervisor_max_iterations: 2,
            max_steps: 100,
            top_k: 10,
        }
    }
}

/// Receipt conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptsConfig {
    /// Command that turns a PDF into text on stdout
    #[serde(rename = "pdf-command")]
    pub pdf_command: String,

    /// Arguments; `{input}` is replaced by the document path, which is
    /// appended when no argument mentions it
    #[serde(rename = "pdf-args")]
    pub pdf_args: Vec<String>,

    /// Conversion timeout in milliseconds
    #[serde(rename = "convert-timeout-ms")]
    pub convert_timeout_ms: u64,
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            pdf_command: "pdftotext".to_string(),
            pdf_args: vec!["-layout".to_string(), "{input}".to_string(), "-".to_string()],
            convert_timeout_ms: 30_000,
        }
    }
}
