//! Corpus discovery
//!
//! Depth-first walk of the repository root. Within a directory, files come
//! before subdirectories and both are sorted by name, so the corpus order is
//! stable across runs.

use std::path::Path;

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::config::DiscoveryConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Corpus, FileRef};

/// Walk `root` and collect every file the filters admit.
///
/// A missing root, a root that is not a directory, or any traversal error is
/// fatal.
pub fn discover(root: &Path, filters: &DiscoveryConfig) -> Result<Corpus> {
    if !root.exists() {
        return Err(PipelineError::discovery(root, "repository path does not exist"));
    }
    if !root.is_dir() {
        return Err(PipelineError::discovery(root, "repository path is not a directory"));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || admits_dir(entry, filters)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            PipelineError::discovery_with_source(root, "failed to walk repository", e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if admits_file(&name, filters) {
            files.push(FileRef::new(entry.path()));
        }
    }

    info!(root = %root.display(), files = files.len(), "Discovered files");
    for file in &files {
        debug!(file = %file, "Discovered");
    }
    Ok(Corpus::new(root, files))
}

fn admits_dir(entry: &DirEntry, filters: &DiscoveryConfig) -> bool {
    let name = entry.file_name().to_string_lossy();
    if filters.excluded_dirs.iter().any(|d| *d == name) {
        return false;
    }
    // included_dirs restricts which top-level directories are entered
    entry.depth() != 1
        || filters.included_dirs.is_empty()
        || filters.included_dirs.iter().any(|d| *d == name)
}

fn admits_file(name: &str, filters: &DiscoveryConfig) -> bool {
    let extension_ok = filters
        .included_extensions
        .iter()
        .any(|ext| name.ends_with(ext.as_str()));
    let excluded = filters
        .excluded_file_prefixes
        .iter()
        .any(|p| name.starts_with(p.as_str()));
    let included = filters.included_file_prefixes.is_empty()
        || filters
            .included_file_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()));
    extension_ok && !excluded && included
}
