//! Hosted-repository link base
//!
//! Looks up the `origin` remote of the repository at the corpus root and
//! turns it into a browsable `https://host/owner/repo/blob/<branch>/` prefix.
//! Anything that doesn't resolve yields an empty base, so links stay relative.

use std::path::Path;

use git2::Repository;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;

static SSH_REMOTE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^git@([^:]+):").ok());

/// URL of the `origin` remote of the repository at `root`.
///
/// Worktrees and submodules (a `.git` file with a `gitdir:` pointer) resolve
/// the same way as a plain checkout.
pub fn origin_url(root: &Path) -> Option<String> {
    let repo = match Repository::open(root) {
        Ok(repo) => repo,
        Err(err) => {
            debug!(root = %root.display(), error = %err, "Not a git repository");
            return None;
        }
    };
    let remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(err) => {
            debug!(error = %err, "No origin remote");
            return None;
        }
    };
    remote
        .url()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Rewrite an SSH remote to HTTPS and drop a trailing `.git`.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    let mut normalized = match SSH_REMOTE_RE.as_ref() {
        Some(re) if url.starts_with("git@") => re.replace(url, "https://$1/").into_owned(),
        _ => url.to_string(),
    };
    if let Some(stripped) = normalized.strip_suffix(".git") {
        normalized = stripped.to_string();
    }
    normalized.trim_end_matches('/').to_string()
}

/// Link prefix for files under `root`; empty when there is no origin remote.
pub fn resolve_base_url(root: &Path, branch: &str) -> String {
    match origin_url(root) {
        Some(url) => {
            let base = format!("{}/blob/{branch}/", normalize_remote_url(&url));
            debug!(base_url = %base, "Resolved remote base URL");
            base
        }
        None => {
            debug!("Using relative links");
            String::new()
        }
    }
}

/// Repository name from the corpus root's final component.
pub fn repo_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}
