//! Structured output parser
//!
//! Pure functions - no async, no IO. Models wrap JSON in prose or code
//! fences; both are tolerated.

use thiserror::Error;

use super::types::StructuredOutput;

/// Why a raw reply could not become a [`StructuredOutput`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("no JSON object found")]
    NoJson { raw: String },

    #[error("invalid structured output: {detail}")]
    Invalid { detail: String, raw: String },
}

impl ParseError {
    /// The reply text that failed, if there was any
    pub fn raw(&self) -> Option<&str> {
        match self {
            ParseError::Empty => None,
            ParseError::NoJson { raw } | ParseError::Invalid { raw, .. } => Some(raw),
        }
    }
}

/// Parse raw inference text into a [`StructuredOutput`].
///
/// Fenced ```json blocks are tried first, then every balanced `{...}` in
/// the text. The first candidate that deserializes wins.
pub fn parse_structured(raw: &str) -> Result<StructuredOutput, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut candidates = extract_code_blocks(trimmed, "json");
    candidates.extend(extract_json_objects(trimmed).into_iter().map(str::to_string));

    if candidates.is_empty() {
        return Err(ParseError::NoJson {
            raw: trimmed.to_string(),
        });
    }

    let mut last_error = None;
    for candidate in &candidates {
        match serde_json::from_str::<StructuredOutput>(candidate) {
            Ok(output) => return Ok(output),
            Err(e) => last_error = Some(e),
        }
    }

    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unrecognized structure".to_string());
    Err(ParseError::Invalid {
        detail,
        raw: trimmed.to_string(),
    })
}

/// Top-level `{...}` spans in `content`, in order.
///
/// Braces inside string literals (escapes included) do not count.
/// An unclosed object at the end is dropped.
pub fn extract_json_objects(content: &str) -> Vec<&str> {
    #[derive(Clone, Copy, PartialEq)]
    enum Scan {
        Code,
        Str,
        StrEscape,
    }

    let mut spans = Vec::new();
    let mut scan = Scan::Code;
    let mut depth = 0usize;
    let mut open = 0usize;

    for (i, byte) in content.bytes().enumerate() {
        scan = match (scan, byte) {
            (Scan::StrEscape, _) => Scan::Str,
            (Scan::Str, b'\\') => Scan::StrEscape,
            (Scan::Str, b'"') => Scan::Code,
            (Scan::Str, _) => Scan::Str,
            (Scan::Code, b'"') => Scan::Str,
            (Scan::Code, b'{') => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
                Scan::Code
            }
            (Scan::Code, b'}') if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&content[open..=i]);
                }
                Scan::Code
            }
            (Scan::Code, _) => Scan::Code,
        };
    }

    spans
}

/// Extract fenced code blocks (```json ... ```)
///
/// The fence tag matches ASCII case-insensitively. Offsets always come from
/// `content` itself, so non-ASCII text around the fences is safe.
pub fn extract_code_blocks(content: &str, language: &str) -> Vec<String> {
    let fence = format!("```{}", language);
    let bytes = content.as_bytes();
    let mut blocks = Vec::new();
    let mut pos = 0usize;

    while let Some(open) = find_fence(bytes, fence.as_bytes(), pos) {
        let body_start = open + fence.len();
        match content[body_start..].find("```") {
            Some(rel_end) => {
                let body_end = body_start + rel_end;
                blocks.push(content[body_start..body_end].trim().to_string());
                pos = body_end + 3;
            }
            None => break,
        }
    }

    blocks
}

/// Start of the next `fence` at or after `from`. The fence begins with a
/// backtick, so any hit is a char boundary.
fn find_fence(haystack: &[u8], fence: &[u8], from: usize) -> Option<usize> {
    if fence.is_empty() || haystack.len() < fence.len() {
        return None;
    }
    (from..=haystack.len() - fence.len())
        .find(|&i| haystack[i..i + fence.len()].eq_ignore_ascii_case(fence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let out = parse_structured(r#"{"internal_thought":"hm","speech_content":"Hello"}"#).unwrap();
        assert_eq!(out.internal_thought, "hm");
        assert_eq!(out.speech_content, "Hello");
        assert!(out.tool_intent.is_none());
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let raw = "Sure, here it is:\n```json\n{\"thought\":\"t\",\"speech\":\"s {braces}\",\"tool\":{\"tool\":\"SEARCH\",\"query\":\"q\"}}\n```\n";
        let out = parse_structured(raw).unwrap();
        assert_eq!(out.speech_content, "s {braces}");
        assert_eq!(out.tool_intent.unwrap().tool, "SEARCH");
    }

    #[test]
    fn test_parse_skips_unrelated_objects() {
        let raw = r#"{"note": 1} then {"thought":"a","speech":"b"}"#;
        assert_eq!(parse_structured(raw).unwrap().speech_content, "b");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_structured("   ").unwrap_err(), ParseError::Empty);
        let err = parse_structured("I am just prose").unwrap_err();
        assert_eq!(err.to_string(), "no JSON object found");
        assert_eq!(err.raw(), Some("I am just prose"));
        assert!(parse_structured(r#"{"thought":"missing speech"}"#).is_err());
    }

    #[test]
    fn test_parse_with_case_folding_prefix() {
        let raw = "İİİİ```JSON\n{\"thought\":\"ş\",\"speech\":\"Grüße\"}\n```İ";
        let out = parse_structured(raw).unwrap();
        assert_eq!(out.speech_content, "Grüße");

        let blocks = extract_code_blocks("ẞ```json {\"a\":1} ``` İ```json", "json");
        assert_eq!(blocks, vec![r#"{"a":1}"#.to_string()]);
        assert!(parse_structured("İİİİ```json").is_err());
    }

    #[test]
    fn test_extract_json_objects_nested_and_escaped() {
        let content = r#"x {"outer": {"inner": "a \" } b"}} y {"n": 2}"#;
        let objects = extract_json_objects(content);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], r#"{"outer": {"inner": "a \" } b"}}"#);
        assert_eq!(objects[1], r#"{"n": 2}"#);

        assert_eq!(extract_json_objects(r#"ü {"a": 1} {"b": {"#), vec![r#"{"a": 1}"#]);
    }
}
