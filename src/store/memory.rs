//! In-process vector store with optional JSON persistence

use super::{cosine_similarity, rank_order, ScoredChunk, SearchFilters, VectorStore};
use crate::errors::{ForgeError, Result};
use crate::persist::write_atomic;
use crate::types::DocumentChunk;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Chunks keyed by chunk id; exact cosine search over all of them
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    chunks: BTreeMap<String, DocumentChunk>,
    path: Option<PathBuf>,
}

impl MemoryVectorStore {
    /// Volatile store, nothing written to disk
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted at `path`, loading existing content
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut chunks = BTreeMap::new();

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))?;
            let stored: Vec<DocumentChunk> = serde_json::from_str(&contents)
                .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))?;
            for chunk in stored {
                chunks.insert(chunk.id(), chunk);
            }
            debug!(path = %path.display(), chunks = chunks.len(), "Loaded vector store");
        }

        Ok(Self {
            chunks,
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&DocumentChunk> {
        self.chunks.get(chunk_id)
    }

    fn write_snapshot(&self, path: &Path) -> Result<()> {
        let chunks: Vec<&DocumentChunk> = self.chunks.values().collect();
        let json = serde_json::to_vec(&chunks)?;
        write_atomic(path, &json)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add_documents(&mut self, chunks: Vec<DocumentChunk>) -> Result<()> {
        for chunk in chunks {
            self.chunks.insert(chunk.id(), chunk);
        }
        Ok(())
    }

    async fn delete(&mut self, chunk_ids: &[String]) -> Result<usize> {
        Ok(chunk_ids
            .iter()
            .filter(|id| self.chunks.remove(id.as_str()).is_some())
            .count())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let mut results: Vec<ScoredChunk> = self
            .chunks
            .values()
            .filter(|chunk| filters.matches(chunk))
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(embedding, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();

        results.sort_by(rank_order);
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.len())
    }

    async fn reset(&mut self) -> Result<()> {
        self.chunks.clear();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)
                    .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))?;
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(path) = self.path.clone() {
            self.write_snapshot(&path)
                .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }
}
