//! Pipeline error types
//!
//! Configuration, discovery, service and validation failures abort the run.
//! Unreadable files are not errors at this level: the batch processor records
//! them in the `BatchResult` and keeps going.

use std::path::PathBuf;

use thiserror::Error;

use crate::client::ServiceError;

/// Error category for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration or missing service identity
    ConfigError,
    /// Corpus discovery failed before the pipeline started
    DiscoveryError,
    /// Rate-limit retries exhausted
    RateLimitError,
    /// Non-retryable failure from the text-generation service
    ServiceError,
    /// Service output could not be validated against the expected shape
    MalformedOutputError,
    /// Scheduling safety net tripped
    IterationCeilingError,
    /// Caller raised the halt signal
    HaltedError,
    /// Rendered document could not be written
    OutputError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::DiscoveryError => "DISCOVERY_ERROR",
            Self::RateLimitError => "RATE_LIMIT_ERROR",
            Self::ServiceError => "SERVICE_ERROR",
            Self::MalformedOutputError => "MALFORMED_OUTPUT_ERROR",
            Self::IterationCeilingError => "ITERATION_CEILING_ERROR",
            Self::HaltedError => "HALTED_ERROR",
            Self::OutputError => "OUTPUT_ERROR",
        }
    }
}

/// Pipeline stage an error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Discovery,
    Batch,
    ProjectSummary,
    Output,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Discovery => "discovery",
            Self::Batch => "batch processing",
            Self::ProjectSummary => "project summary",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("discovery failed under {root}: {message}")]
    Discovery {
        root: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("rate limited after {attempts} attempts: {source}")]
    RateLimitExhausted {
        attempts: usize,
        #[source]
        source: ServiceError,
    },

    #[error("text-generation service error: {0}")]
    Service(#[source] ServiceError),

    #[error("malformed model output: {reason}")]
    MalformedOutput {
        reason: String,
        /// Offending response text, kept for diagnostics
        raw: String,
    },

    #[error("iteration ceiling of {ceiling} exceeded")]
    IterationCeilingExceeded { ceiling: usize },

    #[error("halted after {iterations} iterations")]
    Halted { iterations: usize },

    #[error("batch {index} failed: {source}")]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("project summary failed: {source}")]
    ProjectSummaryFailed {
        #[source]
        source: Box<PipelineError>,
    },

    #[error("failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Get the error category, looking through batch and project wrappers
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::Discovery { .. } => ErrorCategory::DiscoveryError,
            Self::RateLimitExhausted { .. } => ErrorCategory::RateLimitError,
            Self::Service(_) => ErrorCategory::ServiceError,
            Self::MalformedOutput { .. } => ErrorCategory::MalformedOutputError,
            Self::IterationCeilingExceeded { .. } => ErrorCategory::IterationCeilingError,
            Self::Halted { .. } => ErrorCategory::HaltedError,
            Self::BatchFailed { source, .. } | Self::ProjectSummaryFailed { source } => {
                source.category()
            }
            Self::OutputWrite { .. } => ErrorCategory::OutputError,
        }
    }

    /// Pipeline stage that produced the error
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { .. } => Stage::Configuration,
            Self::Discovery { .. } => Stage::Discovery,
            Self::ProjectSummaryFailed { .. } => Stage::ProjectSummary,
            Self::OutputWrite { .. } => Stage::Output,
            Self::RateLimitExhausted { .. }
            | Self::Service(_)
            | Self::MalformedOutput { .. }
            | Self::IterationCeilingExceeded { .. }
            | Self::Halted { .. }
            | Self::BatchFailed { .. } => Stage::Batch,
        }
    }

    /// Raw service output attached to a malformed-output failure
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            Self::BatchFailed { source, .. } | Self::ProjectSummaryFailed { source } => {
                source.raw_output()
            }
            _ => None,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a discovery error
    pub fn discovery(root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Discovery {
            root: root.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a discovery error with source
    pub fn discovery_with_source(
        root: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Discovery {
            root: root.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed-output error
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
