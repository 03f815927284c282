//! Text-generation service seam
//!
//! The pipeline talks to the model through [`TextGenerator`]. The Gemini
//! HTTP client implements it for real runs; tests script responses through
//! the mock module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{ErrorClass, RetryClassifiable};

/// Sampling settings for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationSettings {
    /// Settings for per-batch file summaries
    pub fn batch() -> Self {
        Self {
            temperature: 0.5,
            top_p: 1.0,
            max_output_tokens: 64_000,
        }
    }

    /// Settings for the project-level summary
    pub fn project() -> Self {
        Self {
            temperature: 0.6,
            top_p: 1.0,
            max_output_tokens: 4096,
        }
    }
}

/// One request to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub settings: GenerationSettings,
}

/// Failures reported by the text-generation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse service response: {0}")]
    Parse(String),

    #[error("service returned no text")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RetryClassifiable for ServiceError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            _ => ErrorClass::Permanent,
        }
    }
}

/// Text-generation collaborator.
///
/// Implementations perform exactly one service call per `generate`; retrying
/// is the caller's concern.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        (**self).generate(request).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Scripted generator for tests

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued responses in order and records every request.
    ///
    /// Once the script runs out, further calls return `EmptyResponse`.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<String, ServiceError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a successful response
        pub fn push_ok(&self, text: impl Into<String>) -> &Self {
            self.push(Ok(text.into()))
        }

        /// Queue a failure
        pub fn push_err(&self, err: ServiceError) -> &Self {
            self.push(Err(err))
        }

        fn push(&self, item: Result<String, ServiceError>) -> &Self {
            if let Ok(mut script) = self.script.lock() {
                script.push_back(item);
            }
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }

        pub fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            self.script
                .lock()
                .ok()
                .and_then(|mut s| s.pop_front())
                .unwrap_or(Err(ServiceError::EmptyResponse))
        }
    }
}
