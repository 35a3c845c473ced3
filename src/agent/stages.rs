//! Stage output contracts
//!
//! Every stage turns raw generator text into a typed output or a
//! `ForgeError::Validation` whose code names the broken rule. The
//! orchestrator feeds that error back as a corrective instruction.

use super::parser::{clean_markdown, parse_json};
use crate::config::SeoConfig;
use crate::errors::{ForgeError, Result};
use crate::publish::slug::is_valid_slug;
use crate::publish::validator::check_headings;
use crate::rag::{RetrievedContext, SourceRef};
use crate::types::count_words;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Limits a run's outputs are checked against
#[derive(Debug, Clone, PartialEq)]
pub struct StageRules {
    pub word_bounds: (usize, usize),
    pub outline_sections: (usize, usize),
    pub meta_description_chars: (usize, usize),
    pub excerpt_chars: (usize, usize),
}

impl StageRules {
    pub fn from_parts(word_bounds: (usize, usize), seo: &SeoConfig) -> Self {
        Self {
            word_bounds,
            outline_sections: seo.outline_sections,
            meta_description_chars: seo.meta_description_chars,
            excerpt_chars: seo.excerpt_chars,
        }
    }

    fn check_word_count(&self, words: usize) -> Result<()> {
        let (min, max) = self.word_bounds;
        if words < min {
            return Err(ForgeError::validation(
                "word_count_below_minimum",
                format!("the article has {} words but needs at least {}", words, min),
            ));
        }
        if words > max {
            return Err(ForgeError::validation(
                "word_count_above_maximum",
                format!("the article has {} words but may have at most {}", words, max),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub statement: String,
    /// Source label such as `S2`
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub themes: Vec<String>,
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Sources the facts cite, resolved against the retrieved context
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl ResearchBrief {
    /// Parse and check that the facts cite exactly the retrieved sources
    pub fn parse(raw: &str, context: &RetrievedContext) -> Result<Self> {
        let mut brief: ResearchBrief = parse_json(raw)?;

        if brief.themes.iter().all(|t| t.trim().is_empty()) {
            return Err(ForgeError::validation("research_no_themes", "list at least one theme"));
        }

        let known: BTreeSet<&str> = context.sources.iter().map(|s| s.label.as_str()).collect();
        let mut cited = BTreeSet::new();
        for fact in &brief.facts {
            let label = fact.source.trim().trim_matches(|c| c == '[' || c == ']');
            if !known.contains(label) {
                return Err(ForgeError::validation(
                    "research_unknown_source",
                    format!(
                        "fact '{}' cites '{}', which is not one of the provided sources",
                        fact.statement, fact.source
                    ),
                ));
            }
            cited.insert(label.to_string());
        }

        let missing: Vec<&str> = known.iter().filter(|l| !cited.contains(**l)).copied().collect();
        if !missing.is_empty() {
            return Err(ForgeError::validation(
                "research_missing_source",
                format!("cite at least one fact from each source; missing {}", missing.join(", ")),
            ));
        }

        for fact in &mut brief.facts {
            fact.source = fact.source.trim().trim_matches(|c| c == '[' || c == ']').to_string();
        }
        brief.sources = context.sources.clone();
        Ok(brief)
    }

    pub fn cited_source_ids(&self) -> BTreeSet<String> {
        self.sources.iter().map(|s| s.source_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    #[serde(default)]
    pub subpoints: Vec<String>,
    pub target_words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub headline: String,
    pub sections: Vec<OutlineSection>,
    #[serde(default)]
    pub seo_notes: Vec<String>,
}

impl Outline {
    pub fn parse(raw: &str, rules: &StageRules) -> Result<Self> {
        let outline: Outline = parse_json(raw)?;

        if outline.headline.trim().is_empty() {
            return Err(ForgeError::validation("outline_missing_headline", "the headline is empty"));
        }
        let (min, max) = rules.outline_sections;
        let count = outline.sections.len();
        if count < min || count > max {
            return Err(ForgeError::validation(
                "outline_section_count",
                format!("the outline has {} sections; it needs between {} and {}", count, min, max),
            ));
        }
        if let Some(section) = outline.sections.iter().find(|s| s.heading.trim().is_empty()) {
            return Err(ForgeError::validation(
                "outline_empty_heading",
                format!("a section with {} target words has no heading", section.target_words),
            ));
        }
        Ok(outline)
    }

    pub fn target_words(&self) -> usize {
        self.sections.iter().map(|s| s.target_words).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub body: String,
    pub word_count: usize,
}

impl Draft {
    pub fn parse(raw: &str, rules: &StageRules) -> Result<Self> {
        let body = clean_markdown(raw);
        let word_count = count_words(&body);
        rules.check_word_count(word_count)?;
        Ok(Self { body, word_count })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditedDraft {
    pub body: String,
    pub word_count: usize,
}

impl EditedDraft {
    /// The revised body must keep the word bounds and a clean heading
    /// hierarchy
    pub fn parse(raw: &str, rules: &StageRules) -> Result<Self> {
        let body = clean_markdown(raw);
        let word_count = count_words(&body);
        rules.check_word_count(word_count)?;
        check_headings(&body)?;
        Ok(Self { body, word_count })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoPackage {
    pub title: String,
    pub meta_description: String,
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub excerpt: String,
    #[serde(default)]
    pub internal_links: Vec<String>,
}

impl SeoPackage {
    pub fn parse(raw: &str, rules: &StageRules) -> Result<Self> {
        let mut package: SeoPackage = parse_json(raw)?;
        package.title = package.title.trim().to_string();
        package.meta_description = package.meta_description.trim().to_string();
        package.excerpt = package.excerpt.trim().to_string();
        package.slug = package.slug.trim().to_string();

        if package.title.is_empty() {
            return Err(ForgeError::validation("missing_title", "the title is empty"));
        }
        check_length(
            "meta_description_length",
            "meta description",
            &package.meta_description,
            rules.meta_description_chars,
        )?;
        check_length("excerpt_length", "excerpt", &package.excerpt, rules.excerpt_chars)?;
        if !is_valid_slug(&package.slug) {
            return Err(ForgeError::validation(
                "invalid_slug",
                format!("'{}' must be lowercase words joined by single hyphens", package.slug),
            ));
        }
        Ok(package)
    }
}

/// Editorial verdict on an edited draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub feedback: String,
}

impl ReviewVerdict {
    /// The reply must open with `APPROVED` or `REJECTED`; whatever follows
    /// is the feedback. Anything else counts as a rejection, since an
    /// unreadable review approves nothing.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim_start_matches(|c: char| !c.is_alphanumeric());
        let upper = text.to_uppercase();
        let rest = |keyword: &str| {
            text.get(keyword.len()..)
                .unwrap_or_default()
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .trim()
                .to_string()
        };

        if upper.starts_with("APPROVED") {
            Self {
                approved: true,
                feedback: rest("APPROVED"),
            }
        } else if upper.starts_with("REJECTED") {
            let feedback = rest("REJECTED");
            Self {
                approved: false,
                feedback: if feedback.is_empty() {
                    "The article needs improvement".to_string()
                } else {
                    feedback
                },
            }
        } else {
            Self {
                approved: false,
                feedback: "The review did not start with APPROVED or REJECTED".to_string(),
            }
        }
    }
}

fn check_length(code: &str, what: &str, text: &str, (min, max): (usize, usize)) -> Result<()> {
    let len = text.chars().count();
    if len < min || len > max {
        return Err(ForgeError::validation(
            code,
            format!("the {} is {} characters; it must be {}-{}", what, len, min, max),
        ));
    }
    Ok(())
}
