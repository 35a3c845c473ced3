//! Ingestion Pipeline: corpus scan, frontmatter parsing, chunking,
//! embedding and incremental manifest maintenance

pub mod chunker;
pub mod frontmatter;
pub mod manifest;
pub mod pipeline;

pub use chunker::{Chunker, MarkdownCleaner};
pub use frontmatter::{parse_date, parse_document, split_frontmatter};
pub use manifest::{fingerprint, Manifest, ManifestEntry};
pub use pipeline::{FileFailure, IngestReport, IngestionPipeline, KnowledgeBaseStats};
