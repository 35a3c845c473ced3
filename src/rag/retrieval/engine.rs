//! Retrieval Engine
//!
//! expand → search per query → merge by best score → cap per source →
//! rerank → greedy budgeted context.
//!
//! The store is borrowed per call instead of owned so a generation run can
//! hold a single read guard on the shared store for its whole duration.

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::errors::Result;
use crate::rag::context::{ContextAssembler, RetrievedContext};
use crate::rag::expansion::QueryExpander;
use crate::rag::reranking::ReRanker;
use crate::store::{rank_order, ScoredChunk, SearchFilters, VectorStore};
use crate::types::GenerationRequest;
use chrono::{DateTime, FixedOffset, Local};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    expander: QueryExpander,
    reranker: ReRanker,
    assembler: ContextAssembler,
    top_k: usize,
    max_chunks_per_source: usize,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, expander: QueryExpander, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            expander,
            reranker: ReRanker::new(config.rerank.clone()),
            assembler: ContextAssembler::new(config.context_budget_tokens),
            top_k: config.top_k,
            max_chunks_per_source: config.max_chunks_per_source.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Context for a generation request: its search query, the configured
    /// `k`, and recency measured from the request timestamp
    pub async fn retrieve_for(
        &self,
        store: &dyn VectorStore,
        request: &GenerationRequest,
    ) -> Result<RetrievedContext> {
        self.retrieve_with(
            store,
            &request.search_query(),
            self.top_k,
            &SearchFilters::none(),
            request.requested_at(),
        )
        .await
    }

    /// Context for a bare topic, recency measured from now
    pub async fn retrieve(&self, store: &dyn VectorStore, topic: &str, k: usize) -> Result<RetrievedContext> {
        let now = Local::now().fixed_offset();
        self.retrieve_with(store, topic, k, &SearchFilters::none(), now).await
    }

    pub async fn retrieve_with(
        &self,
        store: &dyn VectorStore,
        query: &str,
        k: usize,
        filters: &SearchFilters,
        reference: DateTime<FixedOffset>,
    ) -> Result<RetrievedContext> {
        if k == 0 || store.count().await? == 0 {
            info!("Knowledge base is empty, continuing without retrieved context");
            return Ok(RetrievedContext::empty(self.assembler.budget()));
        }

        let queries = self.expander.expand(query).await?;
        let embeddings = self.embedder.embed_batch(&queries).await?;

        let mut merged: HashMap<String, ScoredChunk> = HashMap::new();
        for (expanded, embedding) in queries.iter().zip(&embeddings) {
            let hits = store.similarity_search(embedding, k, filters).await?;
            debug!(query = %expanded, hits = hits.len(), "Expanded query searched");
            for hit in hits {
                match merged.get_mut(&hit.chunk.id()) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        merged.insert(hit.chunk.id(), hit);
                    }
                }
            }
        }

        let mut candidates: Vec<ScoredChunk> = merged.into_values().collect();
        candidates.sort_by(rank_order);
        let capped = cap_per_source(candidates, self.max_chunks_per_source);

        let mut ranked = self.reranker.rerank(capped, query, reference);
        ranked.truncate(k);

        let context = self.assembler.assemble(ranked);
        info!(
            queries = queries.len(),
            chunks = context.results.len(),
            sources = context.sources.len(),
            tokens = context.estimated_tokens,
            "Context assembled"
        );
        Ok(context)
    }

    /// Hybrid search without expansion or reranking, for inspecting the
    /// knowledge base
    pub async fn search(&self, store: &dyn VectorStore, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;
        store.hybrid_search(&embedding, query, k, &SearchFilters::none()).await
    }
}

/// Keep at most `cap` chunks per source; input must already be rank ordered
fn cap_per_source(candidates: Vec<ScoredChunk>, cap: usize) -> Vec<ScoredChunk> {
    let mut taken: BTreeMap<String, usize> = BTreeMap::new();
    candidates
        .into_iter()
        .filter(|c| {
            let seen = taken.entry(c.chunk.source_id.clone()).or_insert(0);
            *seen += 1;
            *seen <= cap
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForgeConfig;
    use crate::context::ContextWindow;
    use crate::embedding::HashingEmbedder;
    use crate::gateway::{LlmGateway, RetryPolicy, ScriptedBackend, ScriptedReply};
    use crate::store::MemoryVectorStore;
    use crate::types::DocumentChunk;

    fn chunk(source: &str, index: usize, text: &str, embedder: &HashingEmbedder) -> DocumentChunk {
        DocumentChunk {
            source_id: source.to_string(),
            title: source.trim_end_matches(".md").to_string(),
            date: DateTime::parse_from_rfc3339("2024-05-01T00:00:00+00:00").unwrap(),
            categories: vec!["ai".into()],
            tags: vec![],
            chunk_index: index,
            total_chunks: 4,
            text: text.to_string(),
            embedding: embedder.vectorize(text),
            parent_content_ref: source.to_string(),
            doc_word_count: 100,
            excerpt: None,
        }
    }

    fn engine(replies: Vec<ScriptedReply>, config: &RetrievalConfig) -> (RetrievalEngine, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(replies));
        let gateway = LlmGateway::new(backend.clone(), RetryPolicy::immediate(1), ContextWindow::new(8000));
        let expander = QueryExpander::new(gateway, config.expansions, 0.0).unwrap();
        let embedder = Arc::new(HashingEmbedder::new(64));
        (RetrievalEngine::new(embedder, expander, config), backend)
    }

    async fn populated() -> MemoryVectorStore {
        let embedder = HashingEmbedder::new(64);
        let mut store = MemoryVectorStore::new();
        let mut chunks = Vec::new();
        for i in 0..4 {
            chunks.push(chunk("agents.md", i, &format!("agentic workflows planning loop part {}", i), &embedder));
        }
        chunks.push(chunk("tools.md", 0, "tool calling for agentic workflows", &embedder));
        chunks.push(chunk("rust.md", 0, "ownership and borrowing in rust", &embedder));
        store.add_documents(chunks).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_empty_store_skips_expansion() {
        let config = RetrievalConfig::default();
        let (engine, backend) = engine(vec![], &config);
        let store = MemoryVectorStore::new();
        let ctx = engine.retrieve(&store, "anything", 5).await.unwrap();
        assert!(ctx.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_per_source_cap_applies() {
        let mut config = ForgeConfig::default().retrieval;
        config.max_chunks_per_source = 2;
        let (engine, _) = engine(
            vec![ScriptedReply::text("agentic planning\ntool calling workflows\nagent loops")],
            &config,
        );
        let store = populated().await;
        let ctx = engine.retrieve(&store, "agentic workflows", 10).await.unwrap();

        let from_agents = ctx.results.iter().filter(|r| r.chunk.source_id == "agents.md").count();
        assert!(from_agents <= 2);
        assert!(!ctx.results.is_empty());
        let ranks: Vec<usize> = ctx.results.iter().map(|r| r.rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_deterministic_given_fixed_expansion() {
        let config = RetrievalConfig::default();
        let store = populated().await;
        let reference = DateTime::parse_from_rfc3339("2025-01-01T00:00:00+00:00").unwrap();

        let mut runs = Vec::new();
        for _ in 0..2 {
            let (engine, _) = engine(vec![ScriptedReply::text("agent loops\ntool use")], &config);
            runs.push(
                engine
                    .retrieve_with(&store, "agentic workflows", 5, &SearchFilters::none(), reference)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn test_search_is_direct() {
        let config = RetrievalConfig::default();
        let (engine, backend) = engine(vec![], &config);
        let store = populated().await;
        let hits = engine.search(&store, "ownership borrowing rust", 3).await.unwrap();
        assert_eq!(hits[0].chunk.source_id, "rust.md");
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_cap_per_source_keeps_best() {
        let embedder = HashingEmbedder::new(8);
        let list: Vec<ScoredChunk> = (0..3)
            .map(|i| ScoredChunk {
                chunk: chunk("a.md", i, "t", &embedder),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect();
        let capped = cap_per_source(list, 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].chunk.chunk_index, 0);
        assert_eq!(capped[1].chunk.chunk_index, 1);
    }
}
