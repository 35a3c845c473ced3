//! Structured output extraction
//!
//! Generated text is never trusted as structure. JSON stages locate the
//! first balanced object in the response (models like to wrap it in prose
//! or code fences) and deserialize it strictly; markdown stages are cleaned
//! of wrapping fences and stray frontmatter.

use crate::errors::{ForgeError, Result};
use crate::ingest::frontmatter::split_frontmatter;
use serde::de::DeserializeOwned;

/// Byte range of the first complete top-level `{...}`, respecting strings
/// and escapes
pub fn find_json_object(text: &str) -> Result<Option<(usize, usize)>> {
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' && start.is_some() {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }

        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if start.is_some() => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Ok(Some((s, i)));
                    }
                }
                if depth < 0 {
                    return Err(ForgeError::validation(
                        "invalid_json",
                        "mismatched braces: too many closing braces",
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(None)
}

/// Deserialize the first JSON object found in `text`
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let (start, end) = find_json_object(text)?
        .ok_or_else(|| ForgeError::validation("invalid_json", "response contains no JSON object"))?;
    serde_json::from_str(&text[start..=end])
        .map_err(|e| ForgeError::validation("invalid_json", format!("response does not match the schema: {}", e)))
}

/// Markdown body with a wrapping code fence and any leading frontmatter
/// block removed
pub fn clean_markdown(text: &str) -> String {
    let body = strip_fence(text.trim());
    strip_frontmatter(body).trim().to_string()
}

fn strip_fence(text: &str) -> &str {
    if !text.starts_with("```") || !text.ends_with("```") || text.len() < 6 {
        return text;
    }
    let inner = &text[3..text.len() - 3];
    match inner.find('\n') {
        // the first line is the info string (```markdown)
        Some(newline) if !inner[..newline].contains(' ') => inner[newline + 1..].trim_end(),
        _ => text,
    }
}

/// Drop an accidental `---` frontmatter block at the top of a body
pub fn strip_frontmatter(text: &str) -> &str {
    match split_frontmatter(text.trim_start()) {
        Some((_, body)) => body.trim_start_matches(&['\r', '\n'][..]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        items: Vec<String>,
    }

    #[test]
    fn test_json_inside_prose_and_fence() {
        let text = "Sure! Here it is:\n```json\n{\"name\": \"x\", \"items\": [\"a\", \"b\"]}\n```\nHope that helps.";
        let parsed: Sample = parse_json(text).unwrap();
        assert_eq!(parsed.items, vec!["a", "b"]);
    }

    #[test]
    fn test_braces_in_strings() {
        let text = r#"{"name": "has } brace and \" quote", "items": []}"#;
        let parsed: Sample = parse_json(text).unwrap();
        assert_eq!(parsed.name, "has } brace and \" quote");
    }

    #[test]
    fn test_nested_objects() {
        let text = r#"prefix {"a": {"b": {"c": 1}}} suffix {"d": 2}"#;
        let (start, end) = find_json_object(text).unwrap().unwrap();
        assert_eq!(&text[start..=end], r#"{"a": {"b": {"c": 1}}}"#);
    }

    #[test]
    fn test_missing_or_wrong_shape_is_validation_error() {
        let err = parse_json::<Sample>("no json here").unwrap_err();
        assert_eq!(err.reason_code(), "invalid_json");
        let err = parse_json::<Sample>(r#"{"name": 3}"#).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_json");
        assert!(parse_json::<Sample>(r#"{"name": "unterminated""#).is_err());
    }

    #[test]
    fn test_clean_markdown_strips_fence_and_frontmatter() {
        let text = "```markdown\n---\ntitle: Oops\n---\n\n# Heading\n\nBody text\n```";
        assert_eq!(clean_markdown(text), "# Heading\n\nBody text");
    }

    #[test]
    fn test_clean_markdown_leaves_plain_body() {
        let text = "# Heading\n\n---\n\nAfter a rule";
        assert_eq!(clean_markdown(text), text);
    }
}
