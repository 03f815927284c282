//! Batch summarization pipeline that turns a repository into an `llms.txt`
//! style sitemap.
//!
//! The corpus is split into fixed-size batches. Each batch is summarized by a
//! rate-limited text-generation service in one request, and the results are
//! merged into a store. The flat file list is then folded into depth-bounded
//! sections and rendered as Markdown.

pub mod client;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod processor;
pub mod prompts;
pub mod remote;
pub mod retry;
pub mod sanitize;
pub mod scheduler;
pub mod sitemap;
pub mod store;
pub mod summarizer;
pub mod types;

pub use client::{GenerationRequest, GenerationSettings, ServiceError, TextGenerator};
pub use config::{ConfigLoader, GenConfig};
pub use controller::{ControllerState, IterationController, RunReport};
pub use error::{ErrorCategory, PipelineError, Result, Stage};
pub use gemini::GeminiClient;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use processor::{BatchProcessor, ContentReader, FsReader, ProcessBatch};
pub use retry::{RetryPolicy, call_with_backoff};
pub use sitemap::FinalDocument;
pub use store::SummaryStore;
pub use types::{Batch, BatchResult, BatchStatus, Corpus, FileRef};
