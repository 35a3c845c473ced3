//! blogforge - retrieval-augmented blog post generation
//!
//! Turns a topic request into a validated, SEO-ready markdown post by
//! combining semantic retrieval over an existing corpus with a sequence
//! of generation stages on a local Ollama model.
//!
//! # Architecture
//!
//! - **ingest**: corpus scan, chunking, embedding, incremental manifest
//! - **store**: vector store adapter (in-process or Qdrant)
//! - **gateway**: chat backend with retry, streaming and window fitting
//! - **rag**: query expansion, search, reranking, budgeted context
//! - **agent**: stage state machine over immutable snapshots
//! - **publish**: post validation and collision-safe writes

pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod errors;
pub mod gateway;
pub mod ingest;
pub mod publish;
pub mod rag;
pub mod store;
pub mod types;

mod persist;

pub use agent::{Orchestrator, PipelineOutcome, PipelineStage, PipelineState};
pub use config::ForgeConfig;
pub use errors::{ForgeError, Result};
pub use types::{DocumentChunk, GeneratedPost, GenerationRequest, LengthClass};
