//! Layered configuration
//!
//! 1. Defaults (from `Default` impls)
//! 2. TOML file: explicit path, else `./llms-gen.toml`, else
//!    `<config_dir>/llms-gen/config.toml`
//! 3. Environment variables, `LLMS_GEN_` prefix, `__` for nesting
//!    (e.g. `LLMS_GEN_RETRY__ATTEMPTS=3`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::GenerationSettings;
use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "LLMS_GEN";
/// Variables consulted, in order, when `api_key` is not configured
pub const API_KEY_FALLBACK_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];
/// Default output path, relative to the working directory
pub const DEFAULT_OUTPUT_PATH: &str = "temp/llms.txt";

const LIST_KEYS: [&str; 5] = [
    "discovery.excluded_dirs",
    "discovery.included_dirs",
    "discovery.excluded_file_prefixes",
    "discovery.included_file_prefixes",
    "discovery.included_extensions",
];

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenConfig {
    /// Gemini model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `GEMINI_API_KEY` / `GOOGLE_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// 0 means no limit
    #[serde(default)]
    pub max_files_to_process: usize,

    #[serde(default = "default_iteration_ceiling")]
    pub iteration_ceiling: usize,

    #[serde(default = "default_max_section_depth")]
    pub max_section_depth: usize,

    /// Root-relative file whose content feeds the project summary
    #[serde(default = "default_overview_file")]
    pub overview_file: PathBuf,

    /// Branch used in hosted links
    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Backoff for rate-limited service calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f32,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Total attempts, including the first
    #[serde(default = "default_attempts")]
    pub attempts: usize,
}

/// Filters applied during corpus discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory names never descended into
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    /// Top-level directories to restrict to; empty means all
    #[serde(default)]
    pub included_dirs: Vec<String>,

    #[serde(default = "default_excluded_file_prefixes")]
    pub excluded_file_prefixes: Vec<String>,

    /// Empty means all
    #[serde(default)]
    pub included_file_prefixes: Vec<String>,

    #[serde(default = "default_included_extensions")]
    pub included_extensions: Vec<String>,
}

/// Sampling settings per call type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "GenerationSettings::batch")]
    pub batch: GenerationSettings,

    #[serde(default = "GenerationSettings::project")]
    pub project: GenerationSettings,
}

// Default value functions
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_batch_size() -> usize {
    10
}
fn default_iteration_ceiling() -> usize {
    crate::controller::DEFAULT_ITERATION_CEILING
}
fn default_max_section_depth() -> usize {
    crate::sitemap::DEFAULT_MAX_SECTION_DEPTH
}
fn default_overview_file() -> PathBuf {
    PathBuf::from("README.md")
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_initial_delay_secs() -> u64 {
    2
}
fn default_multiplier() -> f32 {
    2.0
}
fn default_max_delay_secs() -> u64 {
    60
}
fn default_attempts() -> usize {
    5
}
fn default_excluded_dirs() -> Vec<String> {
    [
        ".git",
        ".github",
        "overrides",
        ".venv",
        "node_modules",
        "__pycache__",
        ".pytest_cache",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_excluded_file_prefixes() -> Vec<String> {
    vec!["__init__".to_string()]
}
fn default_included_extensions() -> Vec<String> {
    vec![".md".to_string(), ".py".to_string()]
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_size: default_batch_size(),
            max_files_to_process: 0,
            iteration_ceiling: default_iteration_ceiling(),
            max_section_depth: default_max_section_depth(),
            overview_file: default_overview_file(),
            default_branch: default_branch(),
            retry: RetryConfig::default(),
            discovery: DiscoveryConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            multiplier: default_multiplier(),
            max_delay_secs: default_max_delay_secs(),
            attempts: default_attempts(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: default_excluded_dirs(),
            included_dirs: Vec::new(),
            excluded_file_prefixes: default_excluded_file_prefixes(),
            included_file_prefixes: Vec::new(),
            included_extensions: default_included_extensions(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch: GenerationSettings::batch(),
            project: GenerationSettings::project(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            multiplier: self.multiplier,
            max_delay: Duration::from_secs(self.max_delay_secs),
            max_attempts: self.attempts,
        }
    }
}

impl GenConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be >= 1"));
        }
        if self.iteration_ceiling == 0 {
            return Err(PipelineError::config("iteration_ceiling must be >= 1"));
        }
        if self.retry.attempts == 0 {
            return Err(PipelineError::config("retry.attempts must be >= 1"));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(PipelineError::config("retry.multiplier must be >= 1"));
        }
        if self.retry.initial_delay_secs > self.retry.max_delay_secs {
            return Err(PipelineError::config(
                "retry.initial_delay_secs must not exceed retry.max_delay_secs",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::config("model must not be empty"));
        }
        Ok(())
    }

    /// Configured key, else the first non-empty fallback variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_FALLBACK_VARS
                    .iter()
                    .filter_map(|var| std::env::var(var).ok())
                    .find(|k| !k.trim().is_empty())
            })
    }

    /// Log the effective configuration without the API key
    pub fn log_effective(&self) {
        info!(
            model = %self.model,
            api_key = if self.resolved_api_key().is_some() { "<redacted>" } else { "<unset>" },
            batch_size = self.batch_size,
            max_files_to_process = self.max_files_to_process,
            iteration_ceiling = self.iteration_ceiling,
            max_section_depth = self.max_section_depth,
            retry_attempts = self.retry.attempts,
            retry_initial_delay_secs = self.retry.initial_delay_secs,
            retry_max_delay_secs = self.retry.max_delay_secs,
            retry_multiplier = self.retry.multiplier,
            "Loaded configuration"
        );
    }
}

/// Configuration loader with layered merging support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load and validate. An explicitly set file that does not exist is an
    /// error.
    pub fn load(&self) -> Result<GenConfig> {
        let mut builder = Config::builder();

        let defaults = serde_json::to_string(&GenConfig::default())
            .map_err(|e| PipelineError::config_with_source("failed to serialize defaults", e))?;
        builder = builder.add_source(File::from_str(&defaults, config::FileFormat::Json));

        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(PipelineError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.as_path()));
        }

        let mut env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        builder = builder.add_source(env);

        let config: GenConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::config_with_source("failed to load configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Locate the default config file:
    /// 1. Current directory: ./llms-gen.toml
    /// 2. Config directory: <config_dir>/llms-gen/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./llms-gen.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("llms-gen").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load from `path` if given, else from the default locations
    pub fn load_from(path: Option<&Path>) -> Result<GenConfig> {
        let loader = match path.map(Path::to_path_buf).or_else(Self::find_config_file) {
            Some(path) => ConfigLoader::new().with_file(path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}
