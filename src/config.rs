use crate::errors::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment override for the Ollama base URL
pub const ENV_OLLAMA_URL: &str = "BLOGFORGE_OLLAMA_URL";

/// Environment override for the chat model
pub const ENV_MODEL: &str = "BLOGFORGE_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgeConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    /// Model context window in tokens
    pub context_window: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout_secs: 300,
            context_window: 32_768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub corpus_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Holds the manifest and the persisted in-process store
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("content/blog"),
            output_dir: PathBuf::from("content/blog"),
            data_dir: PathBuf::from(".blogforge"),
        }
    }
}

impl PathsConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("index_manifest.json")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub window_chars: usize,
    /// Characters shared by consecutive chunks
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: 500,
            overlap_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Files parsed and embedded in parallel
    pub concurrency: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Paraphrased queries requested from the model
    pub expansions: usize,
    pub top_k: usize,
    pub max_chunks_per_source: usize,
    /// Token budget B for assembled context
    pub context_budget_tokens: usize,
    pub expansion_temperature: f32,
    pub rerank: RerankWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            expansions: 3,
            top_k: 10,
            max_chunks_per_source: 2,
            context_budget_tokens: 3000,
            expansion_temperature: 0.3,
            rerank: RerankWeights::default(),
        }
    }
}

/// Composite rank weights; tunable rather than fixed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankWeights {
    pub similarity: f32,
    pub recency: f32,
    pub keyword: f32,
    pub recency_half_life_days: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.7,
            recency: 0.1,
            keyword: 0.2,
            recency_half_life_days: 180.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub min_words: usize,
    pub max_words: usize,
    /// Attempts per stage, including the first one
    pub max_stage_attempts: u32,
    pub keyword_density_target: f64,
    /// Output tokens requested per stage call
    pub max_output_tokens: usize,
    /// Editorial reviews of the edited draft; each rejection but the last
    /// sends EDIT back with the reviewer's feedback. 0 disables review.
    pub review_rounds: u32,
    pub temperatures: StageTemperatures,
    pub length_classes: LengthClasses,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_words: 800,
            max_words: 2000,
            max_stage_attempts: 2,
            keyword_density_target: 0.02,
            max_output_tokens: 8000,
            review_rounds: 3,
            temperatures: StageTemperatures::default(),
            length_classes: LengthClasses::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTemperatures {
    pub research: f32,
    pub outline: f32,
    pub write: f32,
    pub edit: f32,
    pub review: f32,
    pub seo: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            research: 0.2,
            outline: 0.4,
            write: 0.7,
            edit: 0.3,
            review: 0.1,
            seo: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthClasses {
    pub short: (usize, usize),
    pub medium: (usize, usize),
    pub long: (usize, usize),
}

impl Default for LengthClasses {
    fn default() -> Self {
        Self {
            short: (600, 1000),
            medium: (1000, 1500),
            long: (1500, 2500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoConfig {
    pub meta_description_chars: (usize, usize),
    pub excerpt_chars: (usize, usize),
    pub outline_sections: (usize, usize),
    pub title_chars: (usize, usize),
    pub layout: String,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            meta_description_chars: (155, 160),
            excerpt_chars: (150, 200),
            outline_sections: (3, 7),
            title_chars: (30, 60),
            layout: "post".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 16000,
            jitter: true,
        }
    }
}

/// Which embedding collaborator turns text into vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embeddings` with `ollama.embedding_model`
    Ollama,
    /// Local BERT model through candle
    Candle,
    /// Feature hashing; no model, fully offline
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Hugging Face model id for the candle backend
    pub candle_model: String,
    /// Vector size reported by the ollama and hashing backends
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            candle_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store persisted to `paths.data_dir/store.json`
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "blog_posts".to_string(),
        }
    }
}

impl ForgeConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str::<ForgeConfig>(&contents)
                .map_err(|e| ForgeError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            let config = ForgeConfig::default();
            config.save_to(path)?;
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ForgeError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ForgeError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".blogforge").join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_OLLAMA_URL) {
            if !url.trim().is_empty() {
                self.ollama.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.trim().is_empty() {
                self.ollama.model = model;
            }
        }
    }

    /// Reject settings that would break pipeline invariants
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.window_chars == 0 || c.overlap_chars >= c.window_chars {
            return Err(ForgeError::Config(format!(
                "chunk overlap ({}) must be smaller than the window ({})",
                c.overlap_chars, c.window_chars
            )));
        }

        let g = &self.generation;
        if g.min_words >= g.max_words {
            return Err(ForgeError::Config(format!(
                "min_words ({}) must be below max_words ({})",
                g.min_words, g.max_words
            )));
        }
        if g.max_stage_attempts == 0 {
            return Err(ForgeError::Config("max_stage_attempts must be at least 1".into()));
        }

        let r = &self.retrieval;
        if r.context_budget_tokens == 0 || r.top_k == 0 || r.max_chunks_per_source == 0 {
            return Err(ForgeError::Config(
                "retrieval budget, top_k and per-source cap must be positive".into(),
            ));
        }

        for (name, (lo, hi)) in [
            ("meta_description_chars", self.seo.meta_description_chars),
            ("excerpt_chars", self.seo.excerpt_chars),
            ("outline_sections", self.seo.outline_sections),
            ("title_chars", self.seo.title_chars),
            ("length_classes.short", g.length_classes.short),
            ("length_classes.medium", g.length_classes.medium),
            ("length_classes.long", g.length_classes.long),
        ] {
            if lo > hi {
                return Err(ForgeError::Config(format!("{} range is inverted", name)));
            }
        }

        if self.embedding.dimension == 0 {
            return Err(ForgeError::Config("embedding.dimension must be positive".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ForgeError::Config("retry.max_attempts must be at least 1".into()));
        }

        Ok(())
    }
}
