//! Full pipeline runs against a scripted text generator.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use llmsgen_core::processor::read_failure_placeholder;
use llmsgen_core::sitemap::NO_SUMMARY;
use llmsgen_core::{
    Batch, BatchProcessor, BatchStatus, ContentReader, ErrorCategory, FileRef, FsReader,
    GenConfig, GenerationRequest, Pipeline, PipelineError, ProcessBatch, RetryPolicy,
    ServiceError, TextGenerator,
};
use llmsgen_core::summarizer::Summarizer;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Replays queued responses and records prompts.
#[derive(Default)]
struct Script {
    responses: Mutex<VecDeque<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<String>>,
}

impl Script {
    fn new(responses: Vec<Result<String, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for Script {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ServiceError::EmptyResponse))
    }
}

/// Filesystem reader that reports permission denied for one path.
struct LockedFile {
    locked: PathBuf,
}

#[async_trait]
impl ContentReader for LockedFile {
    async fn read(&self, file: &FileRef) -> io::Result<String> {
        if file.path() == self.locked {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Permission denied (os error 13)",
            ));
        }
        FsReader.read(file).await
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn key(root: &Path, rel: &str) -> String {
    root.join(rel).to_string_lossy().into_owned()
}

fn test_config() -> GenConfig {
    let mut config = GenConfig {
        api_key: Some("unused".to_string()),
        ..GenConfig::default()
    };
    config.retry.initial_delay_secs = 0;
    config.retry.max_delay_secs = 0;
    config
}

/// Five files across two directory levels; a single batch.
fn five_file_repo() -> (tempfile::TempDir, PathBuf) {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("repo");
    write(&root, "README.md", "# Repo\nA documentation set.");
    write(&root, "docs/guide.md", "# Guide");
    write(&root, "docs/new.md", "# What's new");
    write(&root, "docs/api/index.md", "# API");
    write(&root, "docs/api/v1/intro.md", "# v1 intro");
    let root = fs::canonicalize(root).unwrap();
    (parent, root)
}

#[tokio::test]
async fn five_files_one_summary_omitted() {
    let (_guard, root) = five_file_repo();
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("temp/llms.txt");

    let batch_reply = json!({
        "batch_summaries": {
            key(&root, "README.md"): "Introduces the repository.",
            key(&root, "docs/guide.md"): "Walks through setup.",
            key(&root, "docs/api/index.md"): "Lists the API surface.",
            key(&root, "docs/api/v1/intro.md"): "Introduces version one."
        }
    });
    let script = Script::new(vec![
        Ok(format!("```json\n{batch_reply}\n```")),
        Ok(r#"{"project_summary": "A small documentation set."}"#.to_string()),
    ]);

    let outcome = Pipeline::new(test_config(), script.clone())
        .run(&root, Some(&output))
        .await
        .unwrap();

    assert_eq!(script.calls(), 2);
    assert_eq!(outcome.report.iterations, 1);
    assert_eq!(outcome.report.files_missing_summary, 1);
    assert!(outcome.project_summary_found);

    let doc = &outcome.document;
    assert_eq!(doc.section_names(), vec!["Home", "Docs", "Docs Api"]);

    let docs: Vec<(&str, &str)> = doc.sections[1]
        .entries
        .iter()
        .map(|e| (e.link_text.as_str(), e.summary.as_str()))
        .collect();
    assert_eq!(
        docs,
        vec![("guide.md", "Walks through setup."), ("new.md", NO_SUMMARY)]
    );

    // intro.md is three levels down and folds into docs/api
    let api: Vec<&str> = doc.sections[2]
        .entries
        .iter()
        .map(|e| e.link.as_str())
        .collect();
    assert_eq!(api, vec!["docs/api/index.md", "docs/api/v1/intro.md"]);

    let rendered = fs::read_to_string(&output).unwrap();
    let expected = "# repo Sitemap\n\n\
A small documentation set.\n\n\
## Home\n\n\
- [README.md](README.md): Introduces the repository.\n\n\
## Docs\n\n\
- [guide.md](docs/guide.md): Walks through setup.\n\
- [new.md](docs/new.md): No summary\n\n\
## Docs Api\n\n\
- [index.md](docs/api/index.md): Lists the API surface.\n\
- [intro.md](docs/api/v1/intro.md): Introduces version one.\n\n";
    assert_eq!(rendered, expected);
}

#[tokio::test]
async fn permission_error_downgrades_batch_to_warnings() {
    let (_guard, root) = five_file_repo();
    let locked = root.join("docs/guide.md");

    let summarizer = Summarizer::new(
        Script::new(vec![Ok(json!({
            "batch_summaries": { key(&root, "README.md"): "Introduces the repository." }
        })
        .to_string())]),
        RetryPolicy::default(),
    );
    let processor = BatchProcessor::with_reader(
        summarizer,
        LockedFile {
            locked: locked.clone(),
        },
    );
    let batch = Batch {
        index: 0,
        files: vec![FileRef::new(root.join("README.md")), FileRef::new(&locked)],
    };

    let result = processor.process(&batch).await.unwrap();
    assert_eq!(result.status, BatchStatus::Warnings);
    assert_eq!(
        result.summaries.get(&FileRef::new(&locked)).map(String::as_str),
        Some(read_failure_placeholder("Permission denied (os error 13)").as_str())
    );
    assert_eq!(result.read_failures.len(), 1);
}

#[tokio::test]
async fn permission_error_does_not_fail_the_run() {
    let (_guard, root) = five_file_repo();
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("llms.txt");
    let locked = root.join("docs/guide.md");

    let script = Script::new(vec![
        Ok(json!({
            "batch_summaries": {
                key(&root, "README.md"): "Introduces the repository.",
                key(&root, "docs/new.md"): "Lists changes."
            }
        })
        .to_string()),
        Ok(r#"{"project_summary": "Docs."}"#.to_string()),
    ]);
    let reader = LockedFile {
        locked: locked.clone(),
    };

    let outcome = Pipeline::with_reader(test_config(), script.clone(), reader)
        .run(&root, Some(&output))
        .await
        .unwrap();

    assert_eq!(outcome.report.batches_with_warnings, vec![0]);
    let guide = outcome.document.sections[1]
        .entries
        .iter()
        .find(|e| e.link_text == "guide.md")
        .unwrap();
    assert!(guide.summary.starts_with("Error: Could not read file. Reason:"));

    // the placeholder content was what the service saw for that file
    let first_prompt = script.prompts.lock().unwrap()[0].clone();
    assert!(first_prompt.contains("Error: Could not read file"));
}

#[tokio::test]
async fn rate_limit_exhaustion_aborts_the_run() {
    let (_guard, root) = five_file_repo();
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("llms.txt");

    let quota = || {
        Err(ServiceError::RateLimited {
            message: "RESOURCE_EXHAUSTED".to_string(),
        })
    };
    let mut config = test_config();
    config.retry.attempts = 3;
    let script = Script::new(vec![quota(), quota(), quota()]);

    let err = Pipeline::new(config, script.clone())
        .run(&root, Some(&output))
        .await
        .unwrap_err();

    assert_eq!(script.calls(), 3);
    assert_eq!(err.category(), ErrorCategory::RateLimitError);
    assert!(matches!(err, PipelineError::BatchFailed { index: 0, .. }));
    assert!(!output.exists());
}

#[tokio::test]
async fn multiple_batches_merge_into_one_document() {
    let (_guard, root) = five_file_repo();
    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("llms.txt");

    let mut config = test_config();
    config.batch_size = 2;
    // corpus order: README.md, docs/guide.md, docs/new.md, docs/api/index.md, docs/api/v1/intro.md
    let script = Script::new(vec![
        Ok(json!({"batch_summaries": {
            key(&root, "README.md"): "R.",
            key(&root, "docs/guide.md"): "G."
        }})
        .to_string()),
        Ok(json!({"batch_summaries": {
            key(&root, "docs/new.md"): "N.",
            key(&root, "docs/api/index.md"): "I."
        }})
        .to_string()),
        Ok(json!({"batch_summaries": {
            key(&root, "docs/api/v1/intro.md"): "V."
        }})
        .to_string()),
        Ok(r#"{"project_summary": "P."}"#.to_string()),
    ]);

    let outcome = Pipeline::new(config, script.clone())
        .run(&root, Some(&output))
        .await
        .unwrap();

    assert_eq!(outcome.report.iterations, 3);
    assert_eq!(script.calls(), 4);
    let summaries: Vec<&str> = outcome
        .document
        .sections
        .iter()
        .flat_map(|s| s.entries.iter().map(|e| e.summary.as_str()))
        .collect();
    assert_eq!(summaries, vec!["R.", "G.", "N.", "I.", "V."]);
}

#[tokio::test]
async fn halt_before_start_aborts_without_calls() {
    let (_guard, root) = five_file_repo();
    let script = Script::new(Vec::new());

    let pipeline = Pipeline::new(test_config(), script.clone());
    pipeline.halt_handle().cancel();
    let err = pipeline.run(&root, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::Halted { iterations: 0 }));
    assert_eq!(script.calls(), 0);
}
