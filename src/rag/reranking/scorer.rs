//! Composite re-ranking
//!
//! ```text
//! score = w_sim · similarity
//!       + w_rec · 0.5^(age_days / half_life)
//!       + w_kw  · (query terms found in chunk / query terms)
//! ```
//!
//! Age is measured from the request timestamp, not the wall clock, so a
//! fixed request reranks identically on every run.

use crate::config::RerankWeights;
use crate::store::{query_terms, ScoredChunk};
use crate::types::DocumentChunk;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A reranked chunk; `rank` starts at 1 and scores never increase with rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: DocumentChunk,
    pub relevance_score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct ReRanker {
    weights: RerankWeights,
}

impl Default for ReRanker {
    fn default() -> Self {
        Self::new(RerankWeights::default())
    }
}

impl ReRanker {
    pub fn new(weights: RerankWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RerankWeights {
        &self.weights
    }

    pub fn rerank(
        &self,
        candidates: Vec<ScoredChunk>,
        query: &str,
        reference: DateTime<FixedOffset>,
    ) -> Vec<RetrievalResult> {
        let terms = query_terms(query);

        let mut scored: Vec<(f32, DocumentChunk)> = candidates
            .into_iter()
            .map(|candidate| {
                let score = self.weights.similarity * candidate.score
                    + self.weights.recency * self.recency(&candidate.chunk, reference)
                    + self.weights.keyword * term_overlap(&terms, &candidate.chunk.text);
                (score, candidate.chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id().cmp(&b.1.id())));

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (relevance_score, chunk))| RetrievalResult {
                chunk,
                relevance_score,
                rank: i + 1,
            })
            .collect()
    }

    /// 1.0 for a chunk dated at the reference time, halving every half-life
    fn recency(&self, chunk: &DocumentChunk, reference: DateTime<FixedOffset>) -> f32 {
        let half_life = self.weights.recency_half_life_days;
        if half_life <= 0.0 {
            return 0.0;
        }
        let age_days = (reference - chunk.date).num_seconds().max(0) as f32 / 86_400.0;
        0.5f32.powf(age_days / half_life)
    }
}

fn term_overlap(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}
