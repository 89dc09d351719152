//! Cognitive separation
//!
//! The internal thought is for planning only. A tool tag in it is never
//! executed; it is replaced by the redaction marker.

use regex::Regex;
use std::sync::OnceLock;

use super::types::{GuardIssue, StructuredOutput};

/// Any `[UPPER_CASE: ...]` tag
pub(crate) fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\[([A-Z][A-Z_]*):[^\]]*\]").expect("valid regex"))
}

/// Redact tool tags in the thought. Returns the issue when anything was
/// redacted.
pub fn redact_thought(output: &mut StructuredOutput, marker: &str) -> Option<GuardIssue> {
    let pattern = tag_pattern();
    let tags: Vec<String> = pattern
        .find_iter(&output.internal_thought)
        .map(|m| m.as_str().to_string())
        .collect();
    if tags.is_empty() {
        return None;
    }

    output.internal_thought = pattern
        .replace_all(&output.internal_thought, regex::NoExpand(marker))
        .into_owned();
    Some(GuardIssue::CognitiveViolation { tags })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_tag_in_thought_is_redacted() {
        let mut out = StructuredOutput::new("I should [SEARCH: weather] then [READ: notes.md]", "ok");
        let issue = redact_thought(&mut out, "[REDACTED_TOOL_CALL]").unwrap();

        assert_eq!(
            out.internal_thought,
            "I should [REDACTED_TOOL_CALL] then [REDACTED_TOOL_CALL]"
        );
        assert_eq!(
            issue,
            GuardIssue::CognitiveViolation {
                tags: vec!["[SEARCH: weather]".into(), "[READ: notes.md]".into()]
            }
        );
        assert_eq!(out.speech_content, "ok");
    }

    #[test]
    fn test_clean_thought_untouched() {
        let mut out = StructuredOutput::new("maybe search later [soon]", "ok");
        assert!(redact_thought(&mut out, "[X]").is_none());
        assert_eq!(out.internal_thought, "maybe search later [soon]");
    }
}
