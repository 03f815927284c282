//! Summarization calls
//!
//! Builds the prompt, sends it through the retry wrapper, and validates the
//! reply with the sanitizer.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::client::{GenerationRequest, GenerationSettings, TextGenerator};
use crate::error::{PipelineError, Result};
use crate::prompts::{self, SYSTEM_INSTRUCTION};
use crate::retry::{RetryFailure, RetryPolicy, call_with_backoff};
use crate::sanitize::{BatchSummariesOutput, ProjectSummaryOutput, parse_json};

const PREVIEW_CHARS: usize = 80;

pub struct Summarizer<G> {
    generator: G,
    retry: RetryPolicy,
    batch_settings: GenerationSettings,
    project_settings: GenerationSettings,
}

impl<G: TextGenerator> Summarizer<G> {
    pub fn new(generator: G, retry: RetryPolicy) -> Self {
        Self {
            generator,
            retry,
            batch_settings: GenerationSettings::batch(),
            project_settings: GenerationSettings::project(),
        }
    }

    pub fn with_settings(mut self, batch: GenerationSettings, project: GenerationSettings) -> Self {
        self.batch_settings = batch;
        self.project_settings = project;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Summarize one batch in a single request.
    ///
    /// `contents` maps the path key to the file content. The returned map is
    /// whatever the model produced, unfiltered.
    pub async fn summarize_batch(
        &self,
        contents: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let request = GenerationRequest {
            prompt: prompts::build_batch_prompt(contents),
            system: Some(SYSTEM_INSTRUCTION.to_string()),
            settings: self.batch_settings,
        };
        let raw = self.call(&request).await?;
        let output: BatchSummariesOutput = parse_json(&raw)?;
        debug!(returned = output.batch_summaries.len(), "Parsed batch summaries");
        Ok(output.batch_summaries)
    }

    /// Produce the project-level summary.
    ///
    /// Returns `None` when the model answered with an empty summary.
    pub async fn summarize_project(
        &self,
        summaries: &BTreeMap<String, String>,
        overview: Option<&str>,
    ) -> Result<Option<String>> {
        let request = GenerationRequest {
            prompt: prompts::build_project_prompt(summaries, overview),
            system: Some(SYSTEM_INSTRUCTION.to_string()),
            settings: self.project_settings,
        };
        let raw = self.call(&request).await?;
        let output: ProjectSummaryOutput = parse_json(&raw)?;
        let summary = output.project_summary.trim().to_string();
        info!(chars = summary.len(), "Project summary generated");
        Ok((!summary.is_empty()).then_some(summary))
    }

    async fn call(&self, request: &GenerationRequest) -> Result<String> {
        let raw = call_with_backoff(&self.retry, || self.generator.generate(request))
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => {
                    PipelineError::RateLimitExhausted { attempts, source: last }
                }
                RetryFailure::Permanent(err) => PipelineError::Service(err),
            })?;
        debug!(preview = %preview(&raw), "Service response");
        Ok(raw)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect::<String>().replace('\n', " ")
}
