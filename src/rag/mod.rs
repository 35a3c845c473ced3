//! Retrieval Engine: query expansion, multi-query search, per-source
//! deduplication, reranking and token-budgeted context assembly

pub mod context;
pub mod expansion;
pub mod reranking;
pub mod retrieval;

pub use context::{ContextAssembler, RetrievedContext, SourceRef};
pub use expansion::QueryExpander;
pub use reranking::{ReRanker, RetrievalResult};
pub use retrieval::RetrievalEngine;
