//! Extraction of a verdict from free-text judge output.
//!
//! The judge is asked to answer as
//!
//! ```text
//! Reasoning: <step by step reasoning>
//! Choice: <single letter A-E>
//! ```
//!
//! Everything that depends on that text shape lives in `parse_judge_output`.

use crate::models::JudgeChoice;
use regex::Regex;
use std::sync::LazyLock;

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Reasoning:(.*?)(?:Choice:|\z)").expect("valid reasoning pattern")
});

static CHOICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Choice:[ \t]*(\S)").expect("valid choice pattern"));

/// What could be read out of a judge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJudgeOutput {
    /// `None` when no `Choice:` marker is followed by a letter A-E
    pub choice: Option<JudgeChoice>,
    /// Text between `Reasoning:` and `Choice:` (or end of text), trimmed
    pub reasoning: String,
}

/// Parse judge output.
///
/// The first `Choice:` marker followed by one of `A`-`E` wins; markers followed
/// by anything else are skipped.
pub fn parse_judge_output(content: &str) -> ParsedJudgeOutput {
    let reasoning = REASONING_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let choice = CHOICE_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1)?.as_str().chars().next())
        .find_map(JudgeChoice::from_letter);

    ParsedJudgeOutput { choice, reasoning }
}
