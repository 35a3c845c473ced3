//! Embedding collaborators: text in, fixed-dimension vector out

pub mod engine;
pub mod hashing;
pub mod ollama;

pub use engine::CandleEmbedder;
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

use crate::config::{EmbeddingBackend, ForgeConfig};
use crate::errors::{ForgeError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeddings in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Build the configured embedder; `offline` forces feature hashing
pub async fn from_config(config: &ForgeConfig, offline: bool) -> Result<Arc<dyn Embedder>> {
    let backend = if offline {
        EmbeddingBackend::Hashing
    } else {
        config.embedding.backend
    };
    info!(?backend, "Initializing embedder");

    match backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.embedding.dimension))),
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaEmbedder::with_config(
            &config.ollama.base_url,
            &config.ollama.embedding_model,
            config.embedding.dimension,
            Duration::from_secs(config.ollama.timeout_secs),
        )?)),
        EmbeddingBackend::Candle => {
            let model_id = config.embedding.candle_model.clone();
            let engine = tokio::task::spawn_blocking(move || CandleEmbedder::load(&model_id))
                .await
                .map_err(|e| ForgeError::FatalGateway(format!("Embedder load task failed: {}", e)))??;
            Ok(Arc::new(engine))
        }
    }
}
