//! Shared fixtures: a small corpus, a configured harness around the
//! in-process store and scripted generator, and a store that fails on cue.

#![allow(dead_code)]

use async_trait::async_trait;
use blogforge::agent::Orchestrator;
use blogforge::config::ForgeConfig;
use blogforge::context::ContextWindow;
use blogforge::embedding::HashingEmbedder;
use blogforge::errors::{ForgeError, Result};
use blogforge::gateway::{CompletionRequest, LlmGateway, RetryPolicy, ScriptedBackend, ScriptedReply};
use blogforge::ingest::{IngestReport, IngestionPipeline};
use blogforge::publish::slugify;
use blogforge::store::{self, MemoryVectorStore, ScoredChunk, SearchFilters, SharedStore, VectorStore};
use blogforge::types::{count_words, DocumentChunk, GenerationRequest};
use chrono::{DateTime, FixedOffset};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const TOPIC: &str = "Building Agentic Workflows";

pub fn fixed_time() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2025-03-01T10:00:00+00:00").unwrap()
}

pub fn post_file(title: &str, date: &str, tags: &[&str], body: &str) -> String {
    format!(
        "---\nlayout: post\ntitle: \"{}\"\ndate: {}\ncategories: [ai]\ntags: [{}]\n---\n\n{}\n",
        title,
        date,
        tags.join(", "),
        body
    )
}

/// Roughly `chars` characters of prose about `subject`
pub fn prose(subject: &str, chars: usize) -> String {
    let sentence = format!("{} rely on planning loops, tool calls and careful evaluation. ", subject);
    let mut text = String::new();
    while text.len() < chars {
        text.push_str(&sentence);
    }
    text.truncate(chars);
    text.trim_end().to_string()
}

/// Three sources: two that chunk into two pieces and one single chunk,
/// five chunks in total under a 500/50 window
pub fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("agents-in-practice.md"),
        post_file("Agents in Practice", "2024-09-10 09:00:00 +0000", &["agents"], &prose("Agentic workflows", 700)),
    )
    .unwrap();
    fs::write(
        dir.join("tool-calling.md"),
        post_file("Tool Calling Patterns", "2024-06-02 12:30:00 +0200", &["tools"], &prose("Tool calling agents", 720)),
    )
    .unwrap();
    fs::write(
        dir.join("evaluating-llms.md"),
        post_file("Evaluating LLM Systems", "2024-01-15", &["evaluation"], &prose("Evaluation harnesses", 300)),
    )
    .unwrap();
}

/// Markdown article of exactly `words` whitespace-separated words
pub fn article(title: &str, words: usize) -> String {
    let headings = [
        format!("# {}", title),
        "## Planning loops".to_string(),
        "## Tool calling".to_string(),
        "### Error handling".to_string(),
        "## Evaluation".to_string(),
    ];
    let heading_words: usize = headings.iter().map(|h| count_words(h)).sum();
    let filler = words.saturating_sub(heading_words);
    let per_section = filler / 4;
    let mut remaining = filler;

    let mut out = String::new();
    for (i, heading) in headings.iter().enumerate() {
        out.push_str(heading);
        out.push_str("\n\n");
        if i == 0 {
            continue;
        }
        let n = if i == headings.len() - 1 { remaining } else { per_section };
        remaining -= n;
        let paragraph: Vec<&str> = ["agentic", "workflows", "plan", "act", "observe"]
            .iter()
            .cycle()
            .take(n)
            .copied()
            .collect();
        out.push_str(&paragraph.join(" "));
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

/// Scripted replies for every stage
#[derive(Debug, Clone)]
pub struct Script {
    pub title: String,
    pub write_words: usize,
    pub edit_words: usize,
    pub hang_on_write: bool,
    /// Reviews answered with REJECTED before the first APPROVED
    pub reject_reviews: usize,
    pub reviews: Arc<AtomicUsize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            title: "Building Agentic Workflows That Actually Ship".to_string(),
            write_words: 1200,
            edit_words: 1150,
            hang_on_write: false,
            reject_reviews: 0,
            reviews: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Script {
    pub fn reply(&self, request: &CompletionRequest) -> ScriptedReply {
        let system = request.system_text();
        let user = request.user_text();

        if system.contains("search queries") {
            return ScriptedReply::text("agent planning loops\ntool calling workflows\nevaluating agents");
        }
        if user.contains("\"meta_description\"") {
            let meta = format!("{:.<157}", "How to build agentic workflows");
            let excerpt = format!("{:.<170}", "A practical guide to agentic workflows");
            return ScriptedReply::text(format!(
                "Here is the metadata:\n{{\"title\": \"{}\", \"meta_description\": \"{}\", \"slug\": \"{}\", \
                 \"tags\": [\"agents\", \"workflows\"], \"categories\": [\"ai\"], \"excerpt\": \"{}\", \
                 \"internal_links\": [\"agents-in-practice.md\"]}}",
                self.title,
                meta,
                slugify(&self.title),
                excerpt
            ));
        }
        if user.contains("Reply with APPROVED or REJECTED") {
            let round = self.reviews.fetch_add(1, Ordering::SeqCst);
            if round < self.reject_reviews {
                return ScriptedReply::text(format!(
                    "REJECTED\n- Round {}: add a worked example to the tool calling section",
                    round + 1
                ));
            }
            return ScriptedReply::text("APPROVED\nClear structure and every claim is sourced.");
        }
        if user.contains("Edit the draft below") {
            return ScriptedReply::text(article(TOPIC, self.edit_words));
        }
        if user.contains("Write the full article") {
            if self.hang_on_write {
                return ScriptedReply::Hang;
            }
            return ScriptedReply::text(format!("```markdown\n{}\n```", article(TOPIC, self.write_words)));
        }
        if user.contains("\"headline\"") {
            return ScriptedReply::text(
                r#"{"headline": "Building Agentic Workflows", "sections": [
                    {"heading": "Planning loops", "subpoints": ["plan", "act"], "target_words": 300},
                    {"heading": "Tool calling", "subpoints": ["schemas"], "target_words": 400},
                    {"heading": "Evaluation", "subpoints": [], "target_words": 300}
                ], "seo_notes": ["lead with the keyword"]}"#,
            );
        }
        if user.contains("\"themes\"") {
            let facts: Vec<String> = (1..=10)
                .filter(|n| user.contains(&format!("[S{}]", n)))
                .map(|n| format!("{{\"statement\": \"fact from source {}\", \"source\": \"S{}\"}}", n, n))
                .collect();
            return ScriptedReply::text(format!(
                "{{\"themes\": [\"planning\", \"tools\"], \"facts\": [{}], \"gaps\": [\"cost\"], \
                 \"focus_areas\": [\"reliability\"]}}",
                facts.join(", ")
            ));
        }
        ScriptedReply::Fatal(format!("unexpected prompt: {}", user.chars().take(80).collect::<String>()))
    }

    pub fn backend(self) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::with_responder(move |request| self.reply(request)))
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub config: ForgeConfig,
    pub store: SharedStore,
    pub embedder: Arc<HashingEmbedder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Box::new(MemoryVectorStore::new()))
    }

    pub fn with_store(store: Box<dyn VectorStore>) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = ForgeConfig::default();
        config.paths.corpus_dir = temp.path().join("corpus");
        config.paths.output_dir = temp.path().join("_posts");
        config.paths.data_dir = temp.path().join("data");
        config.chunking.window_chars = 500;
        config.chunking.overlap_chars = 50;
        config.retrieval.top_k = 5;
        config.retrieval.max_chunks_per_source = 2;
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.retry.jitter = false;

        Self {
            temp,
            config,
            store: store::shared(store),
            embedder: Arc::new(HashingEmbedder::new(128)),
        }
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::from_config(&self.config, self.store.clone(), self.embedder.clone()).unwrap()
    }

    pub async fn ingest_corpus(&self) -> IngestReport {
        write_corpus(&self.config.paths.corpus_dir);
        self.pipeline().ingest(&self.config.paths.corpus_dir, false).await.unwrap()
    }

    pub fn orchestrator(&self, backend: Arc<ScriptedBackend>) -> Orchestrator {
        let gateway = LlmGateway::new(backend, RetryPolicy::immediate(3), ContextWindow::new(32_768));
        Orchestrator::from_config(&self.config, gateway, self.embedder.clone(), self.store.clone()).unwrap()
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest::builder(TOPIC)
            .word_range(800, 2000)
            .keywords(["agentic workflows"])
            .categories(["ai"])
            .requested_at(fixed_time())
            .build()
    }

    pub fn published_files(&self) -> Vec<String> {
        match fs::read_dir(&self.config.paths.output_dir) {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Delegates to an in-process store until `fail_after` successful upserts,
/// then reports the store as unreachable
pub struct FailingStore {
    inner: MemoryVectorStore,
    fail_after: usize,
    upserts: AtomicUsize,
}

impl FailingStore {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: MemoryVectorStore::new(),
            fail_after,
            upserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorStore for FailingStore {
    async fn add_documents(&mut self, chunks: Vec<DocumentChunk>) -> Result<()> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(ForgeError::Storage("connection refused".to_string()));
        }
        self.inner.add_documents(chunks).await
    }

    async fn delete(&mut self, chunk_ids: &[String]) -> Result<usize> {
        self.inner.delete(chunk_ids).await
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.similarity_search(embedding, k, filters).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn reset(&mut self) -> Result<()> {
        self.inner.reset().await
    }
}
