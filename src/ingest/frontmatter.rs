//! Markdown frontmatter parsing
//!
//! Accepted date layouts, tried in order:
//! - `2025-10-07 10:30:00 -0500`
//! - `2025-10-07 10:30:00-0500`
//! - `2025-10-07` (midnight UTC)

use crate::errors::{ForgeError, Result};
use crate::types::SourceDocument;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::path::Path;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%z"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) if s.trim().is_empty() => Vec::new(),
            StringOrList::One(s) => vec![s.trim().to_string()],
            StringOrList::Many(v) => v.into_iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrontMatter {
    title: Option<String>,
    date: Option<String>,
    categories: Option<StringOrList>,
    tags: Option<StringOrList>,
    excerpt: Option<String>,
    slug: Option<String>,
}

/// Split `---` delimited frontmatter from the body. Returns `None` when the
/// text does not open with a frontmatter block.
pub fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parse a frontmatter date in any accepted layout
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = DateTime::parse_from_str(value, format) {
            return Some(date);
        }
    }
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

/// Parse one corpus file; every failure is a `RecoverableParse` for `path`
pub fn parse_document(path: &Path, source_id: &str, raw: &str) -> Result<SourceDocument> {
    let fail = |reason: String| ForgeError::RecoverableParse {
        path: path.to_path_buf(),
        reason,
    };

    let (yaml, body) =
        split_frontmatter(raw).ok_or_else(|| fail("missing frontmatter block".to_string()))?;
    let meta: RawFrontMatter =
        serde_yaml::from_str(yaml).map_err(|e| fail(format!("invalid frontmatter: {}", e)))?;

    let date_text = meta.date.ok_or_else(|| fail("missing date".to_string()))?;
    let date = parse_date(&date_text)
        .ok_or_else(|| fail(format!("could not parse date '{}'", date_text)))?;

    Ok(SourceDocument {
        source_id: source_id.to_string(),
        title: meta
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        date,
        categories: meta.categories.map(StringOrList::into_vec).unwrap_or_default(),
        tags: meta.tags.map(StringOrList::into_vec).unwrap_or_default(),
        excerpt: meta.excerpt,
        slug: meta.slug,
        body: body.trim_start_matches(&['\r', '\n'][..]).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "---\nlayout: post\ntitle: \"Agents in Practice\"\ndate: 2025-10-07 10:30:00 -0500\ncategories: engineering\ntags: [rust, agents]\nexcerpt: Short summary\n---\n\n# Agents in Practice\n\nBody text here.\n";

    #[test]
    fn test_parse_document() {
        let doc = parse_document(Path::new("a.md"), "a.md", POST).unwrap();
        assert_eq!(doc.title, "Agents in Practice");
        assert_eq!(doc.categories, vec!["engineering"]);
        assert_eq!(doc.tags, vec!["rust", "agents"]);
        assert_eq!(doc.excerpt.as_deref(), Some("Short summary"));
        assert_eq!(doc.date.to_rfc3339(), "2025-10-07T10:30:00-05:00");
        assert!(doc.body.starts_with("# Agents in Practice"));
    }

    #[test]
    fn test_date_layouts() {
        assert!(parse_date("2025-10-07 10:30:00-0500").is_some());
        let day = parse_date("2025-10-07").unwrap();
        assert_eq!(day.to_rfc3339(), "2025-10-07T00:00:00+00:00");
        assert!(parse_date("07/10/2025").is_none());
    }

    #[test]
    fn test_failures_are_recoverable() {
        let path = Path::new("broken.md");
        for raw in [
            "no frontmatter at all",
            "---\ntitle: [unclosed\n---\nbody",
            "---\ntitle: x\ndate: yesterday\n---\nbody",
            "---\ntitle: x\n---\nbody",
        ] {
            let err = parse_document(path, "broken.md", raw).unwrap_err();
            assert!(matches!(err, ForgeError::RecoverableParse { .. }), "{}", raw);
        }
    }

    #[test]
    fn test_split_frontmatter_requires_closing_fence() {
        assert!(split_frontmatter("---\ntitle: x\n").is_none());
        let (yaml, body) = split_frontmatter("---\r\ntitle: x\r\n---\r\nbody").unwrap();
        assert_eq!(yaml, "title: x\r\n");
        assert_eq!(body, "body");
    }
}
