//! Feature-hashing embedder
//!
//! Each lowercase word token is hashed into one of `dimension` buckets
//! with a sign taken from the same digest; the vector is L2-normalized.
//! Texts sharing vocabulary land close under cosine similarity, which is
//! enough for offline runs and fully reproducible tests.

use super::Embedder;
use crate::errors::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct HashingEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase());
        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Agentic workflows in Rust").await.unwrap();
        let b = embedder.embed("agentic WORKFLOWS in rust").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.vectorize("building agentic workflows");
        let near = embedder.vectorize("agentic workflows need careful building");
        let far = embedder.vectorize("sourdough bread baking temperature");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.vectorize("  ").iter().all(|v| *v == 0.0));
    }
}
