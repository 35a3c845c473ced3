//! Local BERT embeddings via candle
//!
//! Weights and tokenizer come from the Hugging Face hub on first use; the
//! forward pass runs on a blocking thread so async callers never stall.

use super::Embedder;
use crate::errors::{ForgeError, Result};
use anyhow::Context;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

struct Inner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Sentence embeddings with mean pooling over the attention mask
#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<Inner>,
    dimension: usize,
}

impl std::fmt::Debug for CandleEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbedder")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl CandleEmbedder {
    /// Download (or reuse the cached) model and load it on the CPU
    pub fn load(model_id: &str) -> Result<Self> {
        Self::load_inner(model_id).map_err(|e| {
            ForgeError::Config(format!("Failed to load embedding model '{}': {:#}", model_id, e))
        })
    }

    fn load_inner(model_id: &str) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo.get("config.json").context("Failed to download model config")?;
        let tokenizer_path = repo.get("tokenizer.json").context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;
        let dimension = serde_json::from_str::<serde_json::Value>(&config_contents)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .context("Model config has no hidden_size")? as usize;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        // Safety: the safetensors file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], candle_core::DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        Ok(Self {
            inner: Arc::new(Inner {
                model,
                tokenizer,
                device,
            }),
            dimension,
        })
    }

    fn embed_blocking(inner: &Inner, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = inner
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = texts.len();

        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            flat_ids[i * max_len..i * max_len + ids.len()].copy_from_slice(ids);
            flat_mask[i * max_len..i * max_len + mask.len()].copy_from_slice(mask);
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &inner.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &inner.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = inner
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = Self::mean_pool(&hidden, &attention_mask)?;
        let normalized = pooled.broadcast_div(&pooled.sqr()?.sum_keepdim(1)?.sqrt()?)?;

        Ok(normalized.to_vec2::<f32>()?)
    }

    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(sum_embeddings.broadcast_div(&sum_mask)?)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ForgeError::FatalGateway("Embedding model returned no vector".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = self.inner.clone();
        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || Self::embed_blocking(&inner, &texts))
            .await
            .map_err(|e| ForgeError::FatalGateway(format!("Embedding task failed: {}", e)))??;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
