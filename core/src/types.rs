//! Core data types shared across the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Path of a discovered file, used as the key for its summary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(PathBuf);

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// String form used when talking to the text-generation service.
    pub fn as_key(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }

    /// Final path component, or the whole path when it has none.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.as_key())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for FileRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for FileRef {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl From<&str> for FileRef {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

/// Ordered set of files found under one root.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub files: Vec<FileRef>,
}

impl Corpus {
    pub fn new(root: impl Into<PathBuf>, files: Vec<FileRef>) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A contiguous slice of the corpus handled as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position in the schedule
    pub index: usize,
    pub files: Vec<FileRef>,
}

/// Outcome status for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    /// At least one file could not be read
    Warnings,
}

/// A file whose contents could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFailure {
    pub file: FileRef,
    pub reason: String,
}

/// Summaries and diagnostics produced by one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub summaries: BTreeMap<FileRef, String>,
    pub status: BatchStatus,
    pub read_failures: Vec<ReadFailure>,
    /// Requested files the service did not return a summary for
    pub missing: Vec<FileRef>,
}

impl BatchResult {
    pub fn has_warnings(&self) -> bool {
        self.status == BatchStatus::Warnings
    }
}
