//! Embeddings from Ollama's `/api/embeddings` endpoint

use super::Embedder;
use crate::errors::{ForgeError, Result};
use crate::gateway::client::{classify_send_error, classify_status};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn with_config(
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, &self.model));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::FatalGateway(format!("Invalid embedding response: {}", e)))?;

        if parsed.embedding.len() != self.dimension {
            return Err(ForgeError::Config(format!(
                "Model '{}' returned {} dimensions, configured {}",
                self.model,
                parsed.embedding.len(),
                self.dimension
            )));
        }
        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        let embedder = OllamaEmbedder::with_config(
            "http://127.0.0.1:9/",
            "nomic-embed-text",
            768,
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(embedder.dimension(), 768);
        assert!(embedder.embed("hello").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    #[ignore] // requires a running Ollama with nomic-embed-text
    async fn test_live_embedding() {
        let embedder = OllamaEmbedder::with_config(
            "http://127.0.0.1:11434",
            "nomic-embed-text",
            768,
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(embedder.embed("hello world").await.unwrap().len(), 768);
    }
}
