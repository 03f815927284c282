//! Response sanitizing and schema validation
//!
//! Model output is often wrapped in a fenced code block. The fence is a
//! narrow text transform; everything after it is strict `serde_json`
//! deserialization into the expected shape.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{PipelineError, Result};

static FENCE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[\w-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```[ \t]*\r?$").ok()
});

/// Per-file summaries returned for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchSummariesOutput {
    pub batch_summaries: BTreeMap<String, String>,
}

/// Project-level summary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectSummaryOutput {
    pub project_summary: String,
}

/// Strip a single wrapping fenced block, if present.
///
/// Fence markers must sit on their own lines, so backticks inside a JSON
/// value are left alone. The first fence pair wins. Text without a fence
/// comes back trimmed.
pub fn strip_fence(raw: &str) -> &str {
    if let Some(re) = FENCE_RE.as_ref()
        && let Some(caps) = re.captures(raw)
        && let Some(body) = caps.get(1)
    {
        return body.as_str().trim();
    }
    raw.trim()
}

/// Strip fencing and deserialize into `T`.
///
/// Failures carry the untouched raw text.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let body = strip_fence(raw);
    if body.is_empty() {
        return Err(PipelineError::malformed("empty response body", raw));
    }
    serde_json::from_str(body).map_err(|e| PipelineError::malformed(e.to_string(), raw))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let raw = "```json\n{\"a\":\"b\"}\n```";
        let parsed: BTreeMap<String, String> = parse_json(raw).unwrap();
        assert_eq!(parsed.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_unfenced_json_unchanged() {
        let fenced: BTreeMap<String, String> = parse_json("```json\n{\"a\":\"b\"}\n```").unwrap();
        let plain: BTreeMap<String, String> = parse_json("{\"a\":\"b\"}").unwrap();
        assert_eq!(fenced, plain);
    }

    #[test]
    fn test_fence_without_language_tag() {
        assert_eq!(strip_fence("```\n{\"x\": 1}\n```"), "{\"x\": 1}");
    }

    #[test]
    fn test_fence_with_surrounding_prose() {
        let raw = "Here you go:\n```json\n{\"project_summary\": \"ok\"}\n```\nThanks";
        let parsed: ProjectSummaryOutput = parse_json(raw).unwrap();
        assert_eq!(parsed.project_summary, "ok");
    }

    #[test]
    fn test_only_first_fence_is_taken() {
        let raw = "```json\n{\"a\":\"1\"}\n```\n```json\n{\"a\":\"2\"}\n```";
        assert_eq!(strip_fence(raw), "{\"a\":\"1\"}");
    }

    #[test]
    fn test_inline_backticks_in_unfenced_json() {
        let raw = r#"{"batch_summaries": {"/r/a.md": "Wraps code in ```py``` blocks."}}"#;
        assert_eq!(strip_fence(raw), raw);
        let parsed: BatchSummariesOutput = parse_json(raw).unwrap();
        assert_eq!(parsed.batch_summaries["/r/a.md"], "Wraps code in ```py``` blocks.");
    }

    #[test]
    fn test_inline_backticks_inside_fenced_json() {
        let raw = "```json\n{\"project_summary\": \"Use ```bash``` fences.\"}\n```";
        let parsed: ProjectSummaryOutput = parse_json(raw).unwrap();
        assert_eq!(parsed.project_summary, "Use ```bash``` fences.");
    }

    #[test]
    fn test_nested_batch_shape() {
        let raw = r#"{"batch_summaries": {"/repo/a.md": "A", "/repo/b.md": "B"}}"#;
        let parsed: BatchSummariesOutput = parse_json(raw).unwrap();
        assert_eq!(parsed.batch_summaries.len(), 2);
        assert_eq!(parsed.batch_summaries["/repo/b.md"], "B");
    }

    #[test]
    fn test_malformed_keeps_raw_text() {
        let raw = "```json\n{not json}\n```";
        let err = parse_json::<BatchSummariesOutput>(raw).unwrap_err();
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = parse_json::<BatchSummariesOutput>(r#"{"summaries": {}}"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
    }

    #[test]
    fn test_empty_body_is_malformed() {
        let err = parse_json::<ProjectSummaryOutput>("```json\n```").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
    }
}
