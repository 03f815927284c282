//! Section folding and document assembly
//!
//! Files are grouped by their parent directory relative to the corpus root,
//! truncated to `max_depth` components. Sections and the files inside them
//! are ordered by their path strings (so `docs-old` sorts before `docs/api`),
//! and the document is a pure function of its inputs.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::store::FinalizedSummaries;
use crate::types::FileRef;

/// Default number of directory levels a section may span
pub const DEFAULT_MAX_SECTION_DEPTH: usize = 2;
/// Display name of the corpus-root section
pub const ROOT_SECTION_NAME: &str = "Home";
/// Summary rendered for files the store has no entry for
pub const NO_SUMMARY: &str = "No summary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file: FileRef,
    /// File name shown as the link text
    pub link_text: String,
    pub link: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Root-relative directory; empty for the root section
    pub key: PathBuf,
    pub name: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDocument {
    pub repo_name: String,
    pub project_summary: String,
    pub sections: Vec<Section>,
}

/// Root-relative section directory for `file`.
///
/// Files outside `root` are keyed by their own parent directory.
pub fn section_key(file: &FileRef, root: &Path, max_depth: usize) -> PathBuf {
    let parent = file.path().parent().unwrap_or_else(|| Path::new(""));
    let relative = parent.strip_prefix(root).unwrap_or(parent);
    relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .take(max_depth)
        .collect()
}

/// Human-readable section heading: separators become spaces, then
/// title case (first letter of each alphabetic run upper, the rest lower).
pub fn section_display_name(key: &Path) -> String {
    let joined = key
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");
    let joined = joined.trim();
    if joined.is_empty() {
        return ROOT_SECTION_NAME.to_string();
    }
    title_case(joined)
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Root-relative path with `/` separators, as used in links.
fn relative_link_path(file: &FileRef, root: &Path) -> String {
    slash_joined(file.path().strip_prefix(root).unwrap_or(file.path()))
}

fn slash_joined(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Fold every corpus file into its section.
///
/// Every file in `files` gets an entry; those without a summary get
/// [`NO_SUMMARY`].
pub fn assemble(
    repo_name: &str,
    root: &Path,
    files: &[FileRef],
    summaries: &FinalizedSummaries,
    base_url: &str,
    max_depth: usize,
) -> FinalDocument {
    // Keyed by path strings: sections by their root-relative path, files by
    // their full path.
    let mut grouped: BTreeMap<String, (PathBuf, BTreeMap<String, &FileRef>)> = BTreeMap::new();
    for file in files {
        let key = section_key(file, root, max_depth);
        grouped
            .entry(slash_joined(&key))
            .or_insert_with(|| (key, BTreeMap::new()))
            .1
            .insert(file.as_key(), file);
    }

    let sections: Vec<Section> = grouped
        .into_values()
        .map(|(key, members)| {
            let entries = members
                .into_values()
                .map(|file| Entry {
                    file: file.clone(),
                    link_text: file.file_name(),
                    link: format!("{base_url}{}", relative_link_path(file, root)),
                    summary: summaries
                        .files
                        .get(file)
                        .cloned()
                        .unwrap_or_else(|| NO_SUMMARY.to_string()),
                })
                .collect::<Vec<_>>();
            let name = section_display_name(&key);
            debug!(section = %name, files = entries.len(), "Assembled section");
            Section { key, name, entries }
        })
        .collect();

    FinalDocument {
        repo_name: repo_name.to_string(),
        project_summary: summaries.project.clone(),
        sections,
    }
}

impl FinalDocument {
    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    /// Markdown sitemap text
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {} Sitemap\n\n", self.repo_name));
        out.push_str(&format!("{}\n\n", self.project_summary));
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n", section.name));
            for entry in &section.entries {
                out.push_str(&format!(
                    "- [{}]({}): {}\n",
                    entry.link_text, entry.link, entry.summary
                ));
            }
            out.push('\n');
        }
        out
    }

    /// Render and write to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let write_err = |source| PipelineError::OutputWrite {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.render()).map_err(write_err)?;
        info!(
            path = %path.display(),
            sections = self.sections.len(),
            entries = self.entry_count(),
            "Sitemap written"
        );
        Ok(())
    }
}
