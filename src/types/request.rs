//! Generation request: the immutable input of one pipeline run

use crate::config::{GenerationConfig, LengthClasses};
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target length of the post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LengthClass {
    Short,
    #[default]
    Medium,
    Long,
}

impl LengthClass {
    pub fn word_range(&self, classes: &LengthClasses) -> (usize, usize) {
        match self {
            LengthClass::Short => classes.short,
            LengthClass::Medium => classes.medium,
            LengthClass::Long => classes.long,
        }
    }
}

impl FromStr for LengthClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(LengthClass::Short),
            "medium" => Ok(LengthClass::Medium),
            "long" => Ok(LengthClass::Long),
            other => Err(format!("unknown length class '{}'", other)),
        }
    }
}

impl fmt::Display for LengthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LengthClass::Short => "short",
            LengthClass::Medium => "medium",
            LengthClass::Long => "long",
        };
        f.write_str(name)
    }
}

/// Immutable description of the post to generate.
///
/// Fields are only reachable through accessors; build one with
/// [`GenerationRequest::builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    topic: String,
    style: String,
    length: Option<LengthClass>,
    word_range: Option<(usize, usize)>,
    categories: Vec<String>,
    tags: Vec<String>,
    keywords: Vec<String>,
    tone: String,
    requested_at: DateTime<FixedOffset>,
}

impl GenerationRequest {
    pub fn builder(topic: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            topic: topic.into(),
            style: "technical".to_string(),
            length: None,
            word_range: None,
            categories: Vec::new(),
            tags: Vec::new(),
            keywords: Vec::new(),
            tone: "informative".to_string(),
            requested_at: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn length(&self) -> Option<LengthClass> {
        self.length
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn tone(&self) -> &str {
        &self.tone
    }

    /// Timestamp the post is dated with; also the reference point for recency
    pub fn requested_at(&self) -> DateTime<FixedOffset> {
        self.requested_at
    }

    /// Explicit word range if given, then the length class range, then the
    /// configured defaults
    pub fn word_bounds(&self, generation: &GenerationConfig) -> (usize, usize) {
        if let Some(range) = self.word_range {
            return range;
        }
        match self.length {
            Some(class) => class.word_range(&generation.length_classes),
            None => (generation.min_words, generation.max_words),
        }
    }

    /// Topic enriched with the first two keywords, used as the search query
    pub fn search_query(&self) -> String {
        let mut query = self.topic.clone();
        for keyword in self.keywords.iter().take(2) {
            query.push(' ');
            query.push_str(keyword);
        }
        query
    }
}

/// Builder for [`GenerationRequest`]
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    topic: String,
    style: String,
    length: Option<LengthClass>,
    word_range: Option<(usize, usize)>,
    categories: Vec<String>,
    tags: Vec<String>,
    keywords: Vec<String>,
    tone: String,
    requested_at: Option<DateTime<FixedOffset>>,
}

impl RequestBuilder {
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn length(mut self, length: LengthClass) -> Self {
        self.length = Some(length);
        self
    }

    pub fn word_range(mut self, min: usize, max: usize) -> Self {
        self.word_range = Some((min, max));
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn requested_at(mut self, at: DateTime<FixedOffset>) -> Self {
        self.requested_at = Some(at);
        self
    }

    pub fn build(self) -> GenerationRequest {
        GenerationRequest {
            topic: self.topic.trim().to_string(),
            style: self.style,
            length: self.length,
            word_range: self.word_range,
            categories: self.categories,
            tags: self.tags,
            keywords: self.keywords,
            tone: self.tone,
            requested_at: self
                .requested_at
                .unwrap_or_else(|| Local::now().fixed_offset()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_range_overrides_length_class() {
        let generation = GenerationConfig::default();
        let request = GenerationRequest::builder("Building Agentic Workflows")
            .length(LengthClass::Short)
            .word_range(900, 1200)
            .build();
        assert_eq!(request.word_bounds(&generation), (900, 1200));

        let request = GenerationRequest::builder("Topic").length(LengthClass::Long).build();
        assert_eq!(request.word_bounds(&generation), (1500, 2500));

        let request = GenerationRequest::builder("Topic").build();
        assert_eq!(request.word_bounds(&generation), (800, 2000));
    }

    #[test]
    fn test_search_query_uses_first_two_keywords() {
        let request = GenerationRequest::builder("Rust async")
            .keywords(["tokio", "futures", "streams"])
            .build();
        assert_eq!(request.search_query(), "Rust async tokio futures");
    }

    #[test]
    fn test_length_class_parsing() {
        assert_eq!("LONG".parse::<LengthClass>().unwrap(), LengthClass::Long);
        assert!("huge".parse::<LengthClass>().is_err());
    }
}
