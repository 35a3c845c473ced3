//! Corpus-side types: parsed source documents and their chunks

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A parsed corpus file, before chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    /// Path relative to the corpus root, with forward slashes
    pub source_id: String,
    pub title: String,
    pub date: DateTime<FixedOffset>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub excerpt: Option<String>,
    pub slug: Option<String>,
    /// Markdown body without frontmatter
    pub body: String,
}

impl SourceDocument {
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

/// A bounded slice of one source document with its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub source_id: String,
    pub title: String,
    pub date: DateTime<FixedOffset>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Content fingerprint of the parent document
    pub parent_content_ref: String,
    /// Word count of the whole parent document
    #[serde(default)]
    pub doc_word_count: usize,
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl DocumentChunk {
    /// Stable chunk id: `<source_id>#<chunk_index>`, zero padded so that
    /// lexical order matches chunk order
    pub fn id(&self) -> String {
        chunk_id(&self.source_id, self.chunk_index)
    }
}

pub fn chunk_id(source_id: &str, chunk_index: usize) -> String {
    format!("{}#{:05}", source_id, chunk_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids_sort_in_chunk_order() {
        let a = chunk_id("posts/a.md", 2);
        let b = chunk_id("posts/a.md", 10);
        assert!(a < b);
        assert_eq!(a, "posts/a.md#00002");
    }
}
