//! Gemini `generateContent` client
//!
//! Non-streaming JSON request per call. HTTP and API failures are mapped onto
//! [`ServiceError`] so the retry wrapper can tell quota exhaustion apart from
//! everything else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::{GenerationRequest, ServiceError, TextGenerator};
use crate::config::GenConfig;
use crate::error::{PipelineError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google error response format.
#[derive(Debug, Deserialize)]
struct GoogleError {
    code: Option<u16>,
    message: String,
    status: Option<String>,
}

/// Google error wrapper.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Prompt feedback (for blocked prompts).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Gemini API client.
pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// A missing API key is a configuration error.
    pub fn from_config(config: &GenConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            PipelineError::config(
                "missing API key: set api_key, LLMS_GEN_API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY",
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::config_with_source("failed to build HTTP client", e))?;
        Ok(Self::with_client(
            client,
            &config.api_base,
            &config.model,
            api_key,
        ))
    }

    /// Creates a client with a custom HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        api_base: &str,
        model: &str,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_request_body(request: &GenerationRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.settings.temperature,
                "topP": request.settings.top_p,
                "maxOutputTokens": request.settings.max_output_tokens,
                "responseMimeType": "application/json"
            }
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({
                "parts": [{ "text": system }]
            });
        }
        body
    }

    fn headers(&self) -> std::result::Result<HeaderMap, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&self.api_key).map_err(|_| {
                ServiceError::InvalidRequest("API key is not a valid header value".to_string())
            })?,
        );
        Ok(headers)
    }
}

/// Map a non-success HTTP response onto a service error.
fn classify_error(status: u16, body: &str) -> ServiceError {
    let (code, message, api_status) = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => (
            parsed.error.code.unwrap_or(status),
            parsed.error.message,
            parsed.error.status,
        ),
        Err(_) => (status, body.trim().to_string(), None),
    };

    if code == 429 || api_status.as_deref() == Some("RESOURCE_EXHAUSTED") {
        return ServiceError::RateLimited { message };
    }
    match code {
        401 | 403 => ServiceError::NotAuthenticated(message),
        _ => ServiceError::Api {
            status: code,
            message,
        },
    }
}

/// Concatenated text of the first candidate.
fn extract_text(response: GenerateContentResponse) -> std::result::Result<String, ServiceError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ServiceError::Api {
            status: 400,
            message: format!("prompt blocked: {reason}"),
        });
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ServiceError::EmptyResponse);
    };
    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ServiceError::Api {
            status: 400,
            message: "response blocked by safety filters".to_string(),
        });
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ServiceError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, ServiceError> {
        let body = Self::build_request_body(request);
        debug!(model = %self.model, prompt_chars = request.prompt.len(), "Calling generateContent");

        let response = self
            .client
            .post(self.endpoint())
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ServiceError::Parse(e.to_string()))?;
        extract_text(parsed)
    }
}
