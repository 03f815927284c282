//! Aggregation store
//!
//! Running map from file to summary. Written only by the iteration
//! controller; read once at the end through [`SummaryStore::finalize`].

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::{BatchResult, FileRef};

/// Placeholder used when no project summary was produced.
pub const NO_PROJECT_SUMMARY: &str = "No project summary found.";

#[derive(Debug, Default)]
pub struct SummaryStore {
    summaries: BTreeMap<FileRef, String>,
}

/// Accumulated summaries plus the project summary, ready for assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedSummaries {
    pub files: BTreeMap<FileRef, String>,
    pub project: String,
    /// False when `project` is the placeholder
    pub project_found: bool,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert every summary in `result`. Returns how many existing keys were
    /// overwritten.
    pub fn merge(&mut self, result: BatchResult) -> usize {
        let mut overwritten = 0;
        for (file, summary) in result.summaries {
            if self.summaries.insert(file.clone(), summary).is_some() {
                warn!(file = %file, "Summary overwritten by later batch");
                overwritten += 1;
            }
        }
        overwritten
    }

    pub fn get(&self, file: &FileRef) -> Option<&str> {
        self.summaries.get(file).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn summaries(&self) -> &BTreeMap<FileRef, String> {
        &self.summaries
    }

    /// Consume the store. A missing or blank project summary is replaced by
    /// [`NO_PROJECT_SUMMARY`].
    pub fn finalize(self, project_summary: Option<String>) -> FinalizedSummaries {
        let project = project_summary.filter(|s| !s.trim().is_empty());
        let project_found = project.is_some();
        FinalizedSummaries {
            files: self.summaries,
            project: project.unwrap_or_else(|| NO_PROJECT_SUMMARY.to_string()),
            project_found,
        }
    }
}
