//! Post validation
//!
//! Errors block publishing; warnings are reported alongside the published
//! post.

use super::slug::is_valid_slug;
use crate::config::SeoConfig;
use crate::errors::{ForgeError, Result};
use crate::types::GeneratedPost;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeSet;

/// Frontmatter keys the site generator requires, in order
pub const REQUIRED_KEYS: [&str; 7] = ["layout", "title", "date", "categories", "tags", "excerpt", "slug"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub detail: String,
}

impl ValidationIssue {
    fn new(code: &str, detail: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<ForgeError> for ValidationIssue {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::Validation { code, detail } => Self { code, detail },
            other => Self::new(&other.reason_code(), other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub word_count: usize,
    pub keyword_density: Option<f64>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first blocking issue as an error
    pub fn first_error(&self) -> Option<ForgeError> {
        self.errors
            .first()
            .map(|issue| ForgeError::validation(issue.code.clone(), issue.detail.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct PostValidator {
    word_bounds: (usize, usize),
    title_chars: (usize, usize),
    layout: String,
    density_target: f64,
    image_without_alt: Regex,
}

impl PostValidator {
    pub fn new(word_bounds: (usize, usize), seo: &SeoConfig, density_target: f64) -> Result<Self> {
        let image_without_alt = Regex::new(r"!\[\s*\]\(")
            .map_err(|e| ForgeError::Config(format!("bad image pattern: {}", e)))?;
        Ok(Self {
            word_bounds,
            title_chars: seo.title_chars,
            layout: seo.layout.clone(),
            density_target,
            image_without_alt,
        })
    }

    /// `taken` holds the slugs of posts already published
    pub fn validate(&self, post: &GeneratedPost, keywords: &[String], taken: &BTreeSet<String>) -> ValidationReport {
        let mut report = ValidationReport {
            word_count: post.word_count(),
            ..ValidationReport::default()
        };

        if let Err(e) = self.check_front_matter(post) {
            report.errors.push(e.into());
        }

        if !is_valid_slug(&post.slug) {
            report.errors.push(ValidationIssue::new(
                "invalid_slug",
                format!("'{}' is not lowercase and hyphen-separated", post.slug),
            ));
        } else if taken.contains(&post.slug) {
            report.errors.push(ValidationIssue::new(
                "duplicate_slug",
                format!("'{}' is already used by another post", post.slug),
            ));
        }

        if let Err(e) = check_headings(&post.body) {
            report.errors.push(e.into());
        }

        let (min, max) = self.word_bounds;
        if report.word_count < min {
            report.errors.push(ValidationIssue::new(
                "word_count_below_minimum",
                format!("{} words, minimum {}", report.word_count, min),
            ));
        } else if report.word_count > max {
            report.errors.push(ValidationIssue::new(
                "word_count_above_maximum",
                format!("{} words, maximum {}", report.word_count, max),
            ));
        }

        let title_len = post.title.chars().count();
        if title_len < self.title_chars.0 || title_len > self.title_chars.1 {
            report.warnings.push(ValidationIssue::new(
                "title_length",
                format!(
                    "title is {} characters, recommended {}-{}",
                    title_len, self.title_chars.0, self.title_chars.1
                ),
            ));
        }

        if !keywords.is_empty() && report.word_count > 0 {
            let density = keyword_density(&post.body, keywords, report.word_count);
            report.keyword_density = Some(density);
            let (low, high) = (self.density_target * 0.7, self.density_target * 3.0);
            if density < low || density > high {
                report.warnings.push(ValidationIssue::new(
                    "keyword_density",
                    format!("keyword density {:.2}% outside {:.2}%-{:.2}%", density * 100.0, low * 100.0, high * 100.0),
                ));
            }
        }

        let prose = strip_code(&post.body);
        let missing_alt = self.image_without_alt.find_iter(&prose).count();
        if missing_alt > 0 {
            report.warnings.push(ValidationIssue::new(
                "image_missing_alt",
                format!("{} image(s) without alt text", missing_alt),
            ));
        }
        if prose.matches("**").count() % 2 != 0 {
            report
                .warnings
                .push(ValidationIssue::new("unbalanced_bold", "odd number of ** markers"));
        }

        report
    }

    /// Keys present exactly once each, with the expected types and formats
    fn check_front_matter(&self, post: &GeneratedPost) -> Result<()> {
        let front_matter = post.front_matter(&self.layout);
        let value = serde_yaml::to_value(&front_matter)?;
        let Value::Mapping(map) = value else {
            return Err(ForgeError::validation("invalid_front_matter", "frontmatter is not a mapping"));
        };

        let keys: Vec<&str> = map.keys().filter_map(|k| k.as_str()).collect();
        if keys != REQUIRED_KEYS {
            return Err(ForgeError::validation(
                "invalid_front_matter",
                format!("expected keys {:?}, found {:?}", REQUIRED_KEYS, keys),
            ));
        }

        for key in ["layout", "title", "date", "excerpt", "slug"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                _ => {
                    return Err(ForgeError::validation(
                        "invalid_front_matter",
                        format!("'{}' must be a non-empty string", key),
                    ))
                }
            }
        }
        for key in ["categories", "tags"] {
            match map.get(key) {
                Some(Value::Sequence(items)) if items.iter().all(|i| i.is_string()) => {}
                _ => {
                    return Err(ForgeError::validation(
                        "invalid_front_matter",
                        format!("'{}' must be a list of strings", key),
                    ))
                }
            }
        }

        front_matter.parsed_date()?;
        Ok(())
    }
}

/// Exactly one level-1 heading, first, and no level ever skipped
pub fn check_headings(body: &str) -> Result<()> {
    let levels = heading_levels(body);

    match levels.first() {
        None => {
            return Err(ForgeError::validation("missing_top_heading", "the body has no headings"));
        }
        Some(&first) if first != 1 => {
            return Err(ForgeError::validation(
                "missing_top_heading",
                format!("the first heading is level {}, expected a single '#' heading", first),
            ));
        }
        _ => {}
    }

    let top = levels.iter().filter(|&&l| l == 1).count();
    if top > 1 {
        return Err(ForgeError::validation(
            "multiple_top_headings",
            format!("found {} level-1 headings; use exactly one", top),
        ));
    }

    for pair in levels.windows(2) {
        if pair[1] > pair[0] + 1 {
            return Err(ForgeError::validation(
                "skipped_heading_level",
                format!("a level-{} heading follows a level-{} heading", pair[1], pair[0]),
            ));
        }
    }
    Ok(())
}

/// ATX heading levels outside fenced code, in document order
pub fn heading_levels(body: &str) -> Vec<usize> {
    let mut levels = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || line.len() - trimmed.len() > 3 {
            continue;
        }
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if (1..=6).contains(&hashes) {
            let rest = &trimmed[hashes..];
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
                levels.push(hashes);
            }
        }
    }
    levels
}

/// Share of body words taken up by keyword occurrences
pub fn keyword_density(body: &str, keywords: &[String], word_count: usize) -> f64 {
    if word_count == 0 {
        return 0.0;
    }
    let keyword_words: usize = keywords
        .iter()
        .filter_map(|k| keyword_pattern(k).map(|re| (re, k.split_whitespace().count())))
        .map(|(re, words)| re.find_iter(body).count() * words)
        .sum();
    keyword_words as f64 / word_count as f64
}

/// Case-insensitive whole-word match; multi-word keywords tolerate any run
/// of whitespace between their words
fn keyword_pattern(keyword: &str) -> Option<Regex> {
    let words: Vec<String> = keyword.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+"))).ok()
}

fn strip_code(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::POST_DATE_FORMAT;
    use chrono::DateTime;

    fn post(body: &str) -> GeneratedPost {
        GeneratedPost {
            title: "Building Agentic Workflows in Practice".to_string(),
            date: DateTime::parse_from_str("2025-03-01 09:15:00 +0000", POST_DATE_FORMAT).unwrap(),
            categories: vec!["ai".to_string()],
            tags: vec!["agents".to_string()],
            excerpt: "An excerpt".to_string(),
            slug: "building-agentic-workflows".to_string(),
            body: body.to_string(),
        }
    }

    fn validator() -> PostValidator {
        PostValidator::new((10, 100), &SeoConfig::default(), 0.02).unwrap()
    }

    fn good_body() -> String {
        format!("# Title\n\n## Part one\n\n{}\n\n### Detail\n\n## Part two\n", "agents words ".repeat(10))
    }

    #[test]
    fn test_valid_post() {
        let report = validator().validate(&post(&good_body()), &[], &BTreeSet::new());
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_heading_rules() {
        assert!(check_headings("# A\n## B\n### C\n## D").is_ok());
        assert_eq!(check_headings("no headings").unwrap_err().reason_code(), "missing_top_heading");
        assert_eq!(check_headings("## B\n# A").unwrap_err().reason_code(), "missing_top_heading");
        assert_eq!(check_headings("# A\n# B").unwrap_err().reason_code(), "multiple_top_headings");
        assert_eq!(check_headings("# A\n### C").unwrap_err().reason_code(), "skipped_heading_level");
        // comments inside code blocks are not headings
        assert!(check_headings("# A\n```bash\n# install\n### x\n```\n## B").is_ok());
        assert_eq!(heading_levels("#hashtag\n# Real"), vec![1]);
    }

    #[test]
    fn test_duplicate_and_invalid_slug() {
        let taken: BTreeSet<String> = ["building-agentic-workflows".to_string()].into_iter().collect();
        let report = validator().validate(&post(&good_body()), &[], &taken);
        assert_eq!(report.errors[0].code, "duplicate_slug");

        let mut bad = post(&good_body());
        bad.slug = "Bad Slug".to_string();
        let report = validator().validate(&bad, &[], &BTreeSet::new());
        assert_eq!(report.first_error().unwrap().reason_code(), "invalid_slug");
    }

    #[test]
    fn test_empty_excerpt_is_front_matter_error() {
        let mut p = post(&good_body());
        p.excerpt = "  ".to_string();
        let report = validator().validate(&p, &[], &BTreeSet::new());
        assert_eq!(report.errors[0].code, "invalid_front_matter");
    }

    #[test]
    fn test_warnings_do_not_block() {
        let body = format!("{}\n\n![](img.png)\n\n**unclosed", good_body());
        let mut p = post(&body);
        p.title = "Short".to_string();
        let report = validator().validate(&p, &["missing keyword".to_string()], &BTreeSet::new());
        assert!(report.is_valid());
        let codes: Vec<&str> = report.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["title_length", "keyword_density", "image_missing_alt", "unbalanced_bold"]);
    }

    #[test]
    fn test_keyword_density() {
        let density = keyword_density("rust is fast and rust is safe", &["rust".to_string()], 7);
        assert!((density - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_density_matches_whole_words() {
        let keywords = ["rust".to_string()];
        assert_eq!(keyword_density("trust the rusty crust", &keywords, 4), 0.0);
        let density = keyword_density("Rust, and more rust.", &keywords, 4);
        assert!((density - 0.5).abs() < 1e-9);

        let phrase = ["agentic workflows".to_string()];
        let density = keyword_density("Agentic\nworkflows beat agentic-workflows-ish", &phrase, 4);
        assert!((density - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_word_bounds() {
        let report = validator().validate(&post("# Title\n\nshort"), &[], &BTreeSet::new());
        assert_eq!(report.first_error().unwrap().reason_code(), "word_count_below_minimum");
    }
}
