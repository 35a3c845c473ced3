//! Token-budgeted context assembly
//!
//! Ranked results are rendered as labelled blocks and added greedily in
//! rank order. Inclusion stops at the first block that would push the
//! joined text past the budget, so the assembled context never exceeds it.

use crate::context::TokenCounter;
use crate::rag::reranking::RetrievalResult;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

const BLOCK_SEPARATOR: &str = "\n\n";

/// A source document cited by the context, labelled `S1`, `S2`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub label: String,
    pub source_id: String,
    pub title: String,
    pub date: DateTime<FixedOffset>,
}

/// Retrieved material handed to the generation stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetrievedContext {
    /// Results that made it into the budget, in rank order
    pub results: Vec<RetrievalResult>,
    /// One rendered block per result
    pub blocks: Vec<String>,
    /// Distinct sources in order of first appearance
    pub sources: Vec<SourceRef>,
    pub estimated_tokens: usize,
    pub budget: usize,
}

impl RetrievedContext {
    pub fn empty(budget: usize) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// All blocks joined the way they were measured
    pub fn text(&self) -> String {
        self.blocks.join(BLOCK_SEPARATOR)
    }

    pub fn source_labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.label.clone()).collect()
    }

    pub fn label_for(&self, source_id: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.source_id == source_id)
            .map(|s| s.label.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: usize,
    counter: TokenCounter,
}

impl ContextAssembler {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            counter: TokenCounter::new(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn assemble(&self, ranked: Vec<RetrievalResult>) -> RetrievedContext {
        let mut context = RetrievedContext::empty(self.budget);
        let mut joined = String::new();

        for result in ranked {
            let label = match context.label_for(&result.chunk.source_id) {
                Some(label) => label.to_string(),
                None => format!("S{}", context.sources.len() + 1),
            };
            let block = render_block(&label, &result);

            let mut candidate = joined.clone();
            if !candidate.is_empty() {
                candidate.push_str(BLOCK_SEPARATOR);
            }
            candidate.push_str(&block);

            let tokens = self.counter.estimate(&candidate);
            if tokens > self.budget {
                break;
            }

            if context.label_for(&result.chunk.source_id).is_none() {
                context.sources.push(SourceRef {
                    label,
                    source_id: result.chunk.source_id.clone(),
                    title: result.chunk.title.clone(),
                    date: result.chunk.date,
                });
            }
            joined = candidate;
            context.estimated_tokens = tokens;
            context.blocks.push(block);
            context.results.push(result);
        }

        context
    }
}

fn render_block(label: &str, result: &RetrievalResult) -> String {
    format!(
        "[{}] {} ({})\n{}",
        label,
        result.chunk.title,
        result.chunk.date.format("%B %Y"),
        result.chunk.text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentChunk;

    fn result(source: &str, index: usize, rank: usize, text: &str) -> RetrievalResult {
        RetrievalResult {
            chunk: DocumentChunk {
                source_id: source.to_string(),
                title: format!("Title of {}", source),
                date: DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00").unwrap(),
                categories: vec![],
                tags: vec![],
                chunk_index: index,
                total_chunks: 3,
                text: text.to_string(),
                embedding: vec![],
                parent_content_ref: source.to_string(),
                doc_word_count: 0,
                excerpt: None,
            },
            relevance_score: 1.0 / rank as f32,
            rank,
        }
    }

    #[test]
    fn test_labels_follow_first_appearance() {
        let ctx = ContextAssembler::new(10_000).assemble(vec![
            result("b.md", 0, 1, "one"),
            result("a.md", 0, 2, "two"),
            result("b.md", 1, 3, "three"),
        ]);
        assert_eq!(ctx.source_labels(), vec!["S1", "S2"]);
        assert_eq!(ctx.label_for("b.md"), Some("S1"));
        assert!(ctx.blocks[2].starts_with("[S1] Title of b.md (June 2024)"));
    }

    #[test]
    fn test_stops_at_first_overflow() {
        let big = "x".repeat(400);
        let ctx = ContextAssembler::new(150).assemble(vec![
            result("a.md", 0, 1, &big),
            result("b.md", 0, 2, &big),
            result("c.md", 0, 3, "tiny"),
        ]);
        // the second block overflows, so the small third one is not considered
        assert_eq!(ctx.results.len(), 1);
        assert!(ctx.estimated_tokens <= 150);
        assert_eq!(ctx.estimated_tokens, TokenCounter::new().estimate(&ctx.text()));
    }

    #[test]
    fn test_budget_never_exceeded() {
        let counter = TokenCounter::new();
        for budget in [0usize, 1, 10, 57, 200, 1000] {
            for size in [1usize, 13, 99, 500] {
                let ranked: Vec<_> = (0..12)
                    .map(|i| result(&format!("s{}.md", i % 4), i, i + 1, &"y".repeat(size)))
                    .collect();
                let ctx = ContextAssembler::new(budget).assemble(ranked);
                assert!(counter.estimate(&ctx.text()) <= budget);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let ctx = ContextAssembler::new(100).assemble(vec![]);
        assert!(ctx.is_empty());
        assert_eq!(ctx.text(), "");
        assert_eq!(ctx.budget, 100);
    }
}
