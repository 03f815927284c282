//! Prompt templates for the batch and project summarization calls.

use std::collections::BTreeMap;

/// System instruction shared by both calls
pub const SYSTEM_INSTRUCTION: &str = "You are an expert in analyzing code repositories and \
summarising their documentation. Respond with JSON only.";

/// Summary the model is told to use when a file has nothing to summarize
pub const NO_MEANINGFUL_SUMMARY: &str = "No meaningful summary available.";

// ─────────────────────────────────────────────────────────────────────────────
// Batch prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Build the prompt that summarizes every file in one batch.
///
/// `files` maps the path key the model must echo back to the file content
/// (or the read-failure placeholder).
pub fn build_batch_prompt(files: &BTreeMap<String, String>) -> String {
    let files_content =
        serde_json::to_string_pretty(files).unwrap_or_else(|_| format!("{files:?}"));

    format!(
        r#"You are an expert summariser.
Your task is to summarise EACH individual file's content in no more than four sentences.
The summary should reference any key concepts, classes and best practices.
- Do NOT start summaries with text like "This document is about..." or "This page introduces..."
  Just immediately describe the content. E.g.
  - Rather than this: "This document explains how to configure streaming behavior..."
    Say this: "Explains how to configure streaming behavior..."
- If you cannot generate a meaningful summary, use '{NO_MEANINGFUL_SUMMARY}' as its summary.

The final output MUST be a JSON object with a single top-level key called 'batch_summaries',
which maps every file path below to its summary. Use the file paths exactly as given.
Example: {{"batch_summaries": {{"/path/to/file1.md": "Summary of file 1.", "/path/to/file2.md": "Summary of file 2."}}}}

IMPORTANT: Your final response MUST contain ONLY this JSON object.

FILE CONTENTS START:
{files_content}
---
FILE CONTENTS END:

Now return the JSON object.
"#
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Project prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Build the prompt for the project-level summary.
pub fn build_project_prompt(
    summaries: &BTreeMap<String, String>,
    overview: Option<&str>,
) -> String {
    let overview = overview
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no overview file available)");
    let all_summaries =
        serde_json::to_string_pretty(summaries).unwrap_or_else(|_| format!("{summaries:?}"));

    format!(
        r#"Review the project's overview file and the summaries of its individual files below.
Generate a three-paragraph summary of the entire project based on these inputs.

The output MUST be a JSON object with a single key 'project_summary' containing the generated summary.
Example: {{"project_summary": "First paragraph.\n\nSecond paragraph.\n\nThird paragraph."}}

IMPORTANT: Your final response MUST contain ONLY this JSON object.

OVERVIEW START:
{overview}
---
OVERVIEW END:

FILE SUMMARIES START:
{all_summaries}
---
FILE SUMMARIES END:
"#
    )
}
