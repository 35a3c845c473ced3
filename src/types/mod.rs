//! Shared data model: corpus chunks, generation requests and posts

pub mod chunk;
pub mod post;
pub mod request;

pub use chunk::{chunk_id, DocumentChunk, SourceDocument};
pub use post::{count_words, FrontMatter, GeneratedPost, POST_DATE_FORMAT};
pub use request::{GenerationRequest, LengthClass, RequestBuilder};
