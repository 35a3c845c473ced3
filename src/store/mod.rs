//! Vector Store Adapter
//!
//! Chunks are upserted by chunk id and searched by cosine similarity with
//! optional metadata filters. Every back end returns results ordered by
//! score descending with ties broken by chunk id, so identical store
//! state and query give identical ordered results.

pub mod memory;
pub mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

use crate::config::{ForgeConfig, StoreBackend};
use crate::errors::Result;
use crate::types::DocumentChunk;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store handle shared between ingestion (write lock) and generation
/// requests (read lock)
pub type SharedStore = Arc<RwLock<Box<dyn VectorStore>>>;

pub fn shared(store: Box<dyn VectorStore>) -> SharedStore {
    Arc::new(RwLock::new(store))
}

/// Metadata predicates; empty lists match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub date_from: Option<DateTime<FixedOffset>>,
    pub date_to: Option<DateTime<FixedOffset>>,
    /// Chunk must carry at least one of these
    pub categories: Vec<String>,
    /// Chunk must carry at least one of these
    pub tags: Vec<String>,
}

impl SearchFilters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(from) = self.date_from {
            if chunk.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if chunk.date > to {
                return false;
            }
        }
        let any_of = |wanted: &[String], have: &[String]| {
            wanted.is_empty() || wanted.iter().any(|w| have.iter().any(|h| label_key(h) == label_key(w)))
        };
        any_of(&self.categories, &chunk.categories) && any_of(&self.tags, &chunk.tags)
    }
}

/// Normalized form labels are compared in, by every back end
pub fn label_key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// A chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Score descending, then chunk id ascending
pub fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.id().cmp(&b.chunk.id()))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Exact-keyword boost used by hybrid search: 0.1 per query term found in
/// the chunk, at most 0.5
pub fn keyword_boost(query: &str, text: &str) -> f32 {
    let text = text.to_lowercase();
    let matches = query_terms(query)
        .iter()
        .filter(|term| text.contains(term.as_str()))
        .count();
    (matches as f32 * 0.1).min(0.5)
}

/// Lowercase query terms longer than two characters, deduplicated
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace chunks by chunk id
    async fn add_documents(&mut self, chunks: Vec<DocumentChunk>) -> Result<()>;

    /// Remove chunks by id; returns how many existed
    async fn delete(&mut self, chunk_ids: &[String]) -> Result<usize>;

    /// The `k` nearest chunks passing `filters`
    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>>;

    /// Similarity search with exact keyword matches boosted
    async fn hybrid_search(
        &self,
        embedding: &[f32],
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let mut results = self
            .similarity_search(embedding, k.saturating_mul(2), filters)
            .await?;
        for result in &mut results {
            result.score += keyword_boost(query, &result.chunk.text);
        }
        results.sort_by(rank_order);
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize>;

    /// Remove every chunk
    async fn reset(&mut self) -> Result<()>;

    /// Make committed writes durable
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open the configured back end
pub async fn open(config: &ForgeConfig, dimension: usize) -> Result<Box<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Box::new(MemoryVectorStore::open(config.paths.store_path())?)),
        StoreBackend::Qdrant => Ok(Box::new(
            QdrantStore::connect(&config.store.qdrant_url, &config.store.collection, dimension)
                .await?,
        )),
    }
}
