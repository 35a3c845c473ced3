//! The generated post and the frontmatter it is published with

use crate::errors::{ForgeError, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Frontmatter date layout, e.g. `2025-01-15 10:30:00 +0100`
pub const POST_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Word count every word bound uses. Markdown markers such as `#`, `-` or
/// `**` standing alone are not words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

/// Final article produced by a successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub title: String,
    pub date: DateTime<FixedOffset>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub slug: String,
    /// Markdown body, without frontmatter
    pub body: String,
}

impl GeneratedPost {
    pub fn word_count(&self) -> usize {
        count_words(&self.body)
    }

    /// Frontmatter with the given layout
    pub fn front_matter(&self, layout: &str) -> FrontMatter {
        FrontMatter {
            layout: layout.to_string(),
            title: self.title.clone(),
            date: self.date.format(POST_DATE_FORMAT).to_string(),
            categories: self.categories.clone(),
            tags: self.tags.clone(),
            excerpt: self.excerpt.clone(),
            slug: self.slug.clone(),
        }
    }

    /// `{YYYY-MM-DD}-{slug}.md`
    pub fn file_name(&self) -> String {
        format!("{}-{}.md", self.date.format("%Y-%m-%d"), self.slug)
    }
}

/// Exactly the keys the site generator reads, in the order they are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontMatter {
    pub layout: String,
    pub title: String,
    pub date: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub slug: String,
}

impl FrontMatter {
    pub fn parsed_date(&self) -> Result<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.date, POST_DATE_FORMAT).map_err(|e| {
            ForgeError::validation(
                "invalid_date_format",
                format!("'{}' is not YYYY-MM-DD HH:MM:SS ±HHMM: {}", self.date, e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GeneratedPost {
        GeneratedPost {
            title: "My Post".to_string(),
            date: DateTime::parse_from_str("2025-03-01 09:15:00 +0100", POST_DATE_FORMAT).unwrap(),
            categories: vec!["engineering".to_string()],
            tags: vec!["rust".to_string()],
            excerpt: "short".to_string(),
            slug: "my-post".to_string(),
            body: "# My Post\n\nHello there world".to_string(),
        }
    }

    #[test]
    fn test_front_matter_date_format() {
        let fm = sample().front_matter("post");
        assert_eq!(fm.date, "2025-03-01 09:15:00 +0100");
        assert_eq!(fm.parsed_date().unwrap(), sample().date);
    }

    #[test]
    fn test_file_name_and_word_count() {
        let post = sample();
        assert_eq!(post.file_name(), "2025-03-01-my-post.md");
        assert_eq!(post.word_count(), 5);
    }

    #[test]
    fn test_count_words_skips_markdown_markers() {
        assert_eq!(count_words("## Planning loops\n\n- plan\n- act\n\n---\n\n> **note** it's 2x"), 7);
        assert_eq!(count_words("# \n - \n ***"), 0);
    }
}
