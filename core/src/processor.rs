//! Batch processing
//!
//! One batch becomes one `BatchResult`:
//! 1. Read every file concurrently; failures become a placeholder content
//! 2. Summarize the whole batch in a single request
//! 3. Keep only requested keys, recording the ones the model left out

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::client::TextGenerator;
use crate::error::Result;
use crate::summarizer::Summarizer;
use crate::types::{Batch, BatchResult, BatchStatus, FileRef, ReadFailure};

/// Content substituted for a file that could not be read.
pub fn read_failure_placeholder(reason: &str) -> String {
    format!("Error: Could not read file. Reason: {reason}")
}

/// Source of file contents.
#[async_trait]
pub trait ContentReader: Send + Sync {
    async fn read(&self, file: &FileRef) -> io::Result<String>;
}

/// Reads files from the local filesystem as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait]
impl ContentReader for FsReader {
    async fn read(&self, file: &FileRef) -> io::Result<String> {
        tokio::fs::read_to_string(file.path()).await
    }
}

/// Stage run by the iteration controller for each batch.
#[async_trait]
pub trait ProcessBatch: Send + Sync {
    async fn process(&self, batch: &Batch) -> Result<BatchResult>;
}

pub struct BatchProcessor<G, R = FsReader> {
    summarizer: Summarizer<G>,
    reader: R,
}

impl<G: TextGenerator> BatchProcessor<G, FsReader> {
    pub fn new(summarizer: Summarizer<G>) -> Self {
        Self {
            summarizer,
            reader: FsReader,
        }
    }
}

impl<G: TextGenerator, R: ContentReader> BatchProcessor<G, R> {
    pub fn with_reader(summarizer: Summarizer<G>, reader: R) -> Self {
        Self { summarizer, reader }
    }

    pub fn summarizer(&self) -> &Summarizer<G> {
        &self.summarizer
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    async fn read_all(&self, files: &[FileRef]) -> (BTreeMap<String, String>, Vec<ReadFailure>) {
        let reads = join_all(files.iter().map(|file| self.reader.read(file))).await;

        let mut contents = BTreeMap::new();
        let mut failures = Vec::new();
        for (file, read) in files.iter().zip(reads) {
            match read {
                Ok(content) => {
                    debug!(
                        file = %file,
                        bytes = content.len(),
                        head = %content.chars().take(80).collect::<String>().replace('\n', " "),
                        "Read file"
                    );
                    contents.insert(file.as_key(), content);
                }
                Err(err) => {
                    let reason = err.to_string();
                    warn!(file = %file, error = %reason, "Could not read file");
                    contents.insert(file.as_key(), read_failure_placeholder(&reason));
                    failures.push(ReadFailure {
                        file: file.clone(),
                        reason,
                    });
                }
            }
        }
        (contents, failures)
    }
}

#[async_trait]
impl<G: TextGenerator, R: ContentReader> ProcessBatch for BatchProcessor<G, R> {
    async fn process(&self, batch: &Batch) -> Result<BatchResult> {
        let (contents, read_failures) = self.read_all(&batch.files).await;

        let mut returned = if batch.files.is_empty() {
            BTreeMap::new()
        } else {
            self.summarizer.summarize_batch(&contents).await?
        };

        let mut summaries = BTreeMap::new();
        let mut missing = Vec::new();
        for file in &batch.files {
            let key = file.as_key();
            if let Some(summary) = returned.remove(&key) {
                summaries.insert(file.clone(), summary);
            } else if let Some(failure) = read_failures.iter().find(|f| &f.file == file) {
                summaries.insert(file.clone(), read_failure_placeholder(&failure.reason));
            } else {
                missing.push(file.clone());
            }
        }

        if !returned.is_empty() {
            let extra: BTreeSet<&String> = returned.keys().collect();
            warn!(
                batch = batch.index,
                extra = ?extra,
                "Discarding summaries for unrequested files"
            );
        }
        if !missing.is_empty() {
            warn!(
                batch = batch.index,
                missing = missing.len(),
                "Service omitted summaries for some files"
            );
        }

        let status = if read_failures.is_empty() {
            BatchStatus::Success
        } else {
            BatchStatus::Warnings
        };
        info!(
            batch = batch.index,
            files = batch.files.len(),
            summarized = summaries.len(),
            status = ?status,
            "Batch processed"
        );

        Ok(BatchResult {
            summaries,
            status,
            read_failures,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::client::mock::ScriptedGenerator;
    use crate::error::PipelineError;
    use crate::retry::RetryPolicy;

    /// In-memory reader; paths not in the map fail with permission denied.
    struct MapReader(HashMap<String, String>);

    #[async_trait]
    impl ContentReader for MapReader {
        async fn read(&self, file: &FileRef) -> io::Result<String> {
            self.0
                .get(&file.as_key())
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"))
        }
    }

    fn processor(
        generator: ScriptedGenerator,
        files: &[(&str, &str)],
    ) -> BatchProcessor<ScriptedGenerator, MapReader> {
        let retry = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let reader = MapReader(
            files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        BatchProcessor::with_reader(Summarizer::new(generator, retry), reader)
    }

    fn batch(files: &[&str]) -> Batch {
        Batch {
            index: 0,
            files: files.iter().map(|f| FileRef::from(*f)).collect(),
        }
    }

    #[tokio::test]
    async fn test_all_reads_succeed() {
        let generator = ScriptedGenerator::new();
        generator.push_ok(r#"{"batch_summaries": {"/r/a.md": "A.", "/r/b.md": "B."}}"#);
        let p = processor(generator, &[("/r/a.md", "a"), ("/r/b.md", "b")]);

        let result = p.process(&batch(&["/r/a.md", "/r/b.md"])).await.unwrap();
        assert_eq!(result.status, BatchStatus::Success);
        assert_eq!(result.summaries.len(), 2);
        assert!(result.missing.is_empty());
        assert_eq!(p.summarizer().generator().calls(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_downgrades_to_warnings() {
        let generator = ScriptedGenerator::new();
        generator.push_ok(r#"{"batch_summaries": {"/r/a.md": "A."}}"#);
        let p = processor(generator, &[("/r/a.md", "a")]);

        let result = p.process(&batch(&["/r/a.md", "/r/locked.md"])).await.unwrap();
        assert_eq!(result.status, BatchStatus::Warnings);
        assert_eq!(result.read_failures.len(), 1);
        let locked = &result.summaries[&FileRef::from("/r/locked.md")];
        assert!(locked.starts_with("Error: Could not read file. Reason:"));

        // the placeholder is what gets sent for summarization
        let prompt = &p.summarizer().generator().requests()[0].prompt;
        assert!(prompt.contains("Error: Could not read file"));
    }

    #[tokio::test]
    async fn test_omitted_key_recorded_as_missing() {
        let generator = ScriptedGenerator::new();
        generator.push_ok(r#"{"batch_summaries": {"/r/a.md": "A."}}"#);
        let p = processor(generator, &[("/r/a.md", "a"), ("/r/b.md", "b")]);

        let result = p.process(&batch(&["/r/a.md", "/r/b.md"])).await.unwrap();
        assert_eq!(result.status, BatchStatus::Success);
        assert_eq!(result.missing, vec![FileRef::from("/r/b.md")]);
        assert!(!result.summaries.contains_key(&FileRef::from("/r/b.md")));
    }

    #[tokio::test]
    async fn test_unrequested_keys_discarded() {
        let generator = ScriptedGenerator::new();
        generator.push_ok(r#"{"batch_summaries": {"/r/a.md": "A.", "/r/ghost.md": "?"}}"#);
        let p = processor(generator, &[("/r/a.md", "a")]);

        let result = p.process(&batch(&["/r/a.md"])).await.unwrap();
        assert_eq!(result.summaries.len(), 1);
        assert!(!result.summaries.contains_key(&FileRef::from("/r/ghost.md")));
    }

    #[tokio::test]
    async fn test_malformed_output_fails_batch() {
        let generator = ScriptedGenerator::new();
        generator.push_ok("not json at all");
        let p = processor(generator, &[("/r/a.md", "a")]);

        let err = p.process(&batch(&["/r/a.md"])).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn test_fs_reader_reports_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.md");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = FsReader.read(&FileRef::from(path.as_path())).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
