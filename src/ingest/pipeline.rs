//! Ingestion Pipeline
//!
//! Files are parsed and embedded concurrently, then committed one at a
//! time in corpus order: old chunks removed, new chunks upserted in
//! `chunk_index` order, store flushed, manifest saved. A file is either
//! fully committed or not at all, so an aborted run leaves the manifest
//! describing exactly what the store holds.

use super::chunker::Chunker;
use super::frontmatter::parse_document;
use super::manifest::{fingerprint, Manifest};
use crate::config::ForgeConfig;
use crate::embedding::Embedder;
use crate::errors::{ForgeError, Result};
use crate::gateway::RetryPolicy;
use crate::store::{SharedStore, VectorStore};
use crate::types::{DocumentChunk, SourceDocument};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A file that could not be ingested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub source_id: String,
    pub reason: String,
}

/// Per-run counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub pruned: usize,
    pub chunks_written: usize,
    pub failures: Vec<FileFailure>,
}

/// Knowledge-base summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeBaseStats {
    pub documents: usize,
    pub chunks: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

struct Candidate {
    path: PathBuf,
    source_id: String,
    fingerprint: String,
    raw: String,
}

struct PreparedFile {
    source_id: String,
    fingerprint: String,
    chunks: Vec<DocumentChunk>,
}

pub struct IngestionPipeline {
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    retry: RetryPolicy,
    manifest_path: PathBuf,
    concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: SharedStore,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            retry: RetryPolicy::default(),
            manifest_path: manifest_path.into(),
            concurrency: num_cpus::get(),
        }
    }

    pub fn from_config(
        config: &ForgeConfig,
        store: SharedStore,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            embedder,
            Chunker::new(&config.chunking)?,
            config.paths.manifest_path(),
        )
        .with_concurrency(config.ingestion.concurrency)
        .with_retry(RetryPolicy::from_config(&config.retry)))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Index `corpus_dir`. With `force` every file is reprocessed;
    /// otherwise files whose fingerprint matches the manifest are skipped.
    pub async fn ingest(&self, corpus_dir: &Path, force: bool) -> Result<IngestReport> {
        if !corpus_dir.is_dir() {
            return Err(ForgeError::Config(format!(
                "corpus directory {} does not exist",
                corpus_dir.display()
            )));
        }

        // Exclusive for the whole run; generation waits on the read side
        let mut guard = self.store.write().await;
        let store: &mut dyn VectorStore = &mut **guard;
        let mut manifest = Manifest::load(&self.manifest_path)?;

        let files = scan_corpus(corpus_dir);
        let mut report = IngestReport {
            scanned: files.len(),
            ..Default::default()
        };
        info!(corpus = %corpus_dir.display(), files = files.len(), force, "Starting ingestion");

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for path in files {
            let source_id = source_id_for(corpus_dir, &path);
            seen.insert(source_id.clone());

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(source = %source_id, error = %e, "Unreadable corpus file");
                    report.failures.push(FileFailure {
                        source_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let fingerprint = fingerprint(&bytes);
            if !force && manifest.is_current(&source_id, &fingerprint) {
                debug!(source = %source_id, "Unchanged, skipping");
                report.skipped += 1;
                continue;
            }
            candidates.push(Candidate {
                path,
                source_id,
                fingerprint,
                raw: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let mut prepared = stream::iter(candidates)
            .map(|candidate| self.prepare(candidate))
            .buffered(self.concurrency);

        while let Some(outcome) = prepared.next().await {
            match outcome {
                Ok(file) => {
                    let source_id = file.source_id.clone();
                    match self.commit(store, &mut manifest, file).await {
                        Ok(written) => {
                            info!(source = %source_id, chunks = written, "Indexed");
                            report.indexed += 1;
                            report.chunks_written += written;
                        }
                        Err(e) => {
                            warn!(
                                source = %source_id,
                                committed = report.indexed,
                                error = %e,
                                "Storage failure, aborting ingestion"
                            );
                            return Err(e);
                        }
                    }
                }
                Err((source_id, e)) if e.is_fatal() => {
                    warn!(source = %source_id, error = %e, "Fatal embedding failure, aborting ingestion");
                    return Err(e);
                }
                Err((source_id, e)) => {
                    warn!(source = %source_id, error = %e, "Skipping file");
                    report.failures.push(FileFailure {
                        source_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(prepared);

        let stale: Vec<String> = manifest
            .entries
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for source_id in stale {
            if let Some(entry) = manifest.get(&source_id).cloned() {
                store.delete(&entry.chunk_ids).await?;
                store.flush().await?;
                manifest.remove(&source_id);
                manifest.save(&self.manifest_path)?;
                info!(source = %source_id, chunks = entry.chunk_ids.len(), "Pruned deleted source");
                report.pruned += 1;
            }
        }

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            pruned = report.pruned,
            failed = report.failures.len(),
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Parse, chunk and embed one file
    async fn prepare(
        &self,
        candidate: Candidate,
    ) -> std::result::Result<PreparedFile, (String, ForgeError)> {
        let source_id = candidate.source_id.clone();
        self.prepare_inner(candidate)
            .await
            .map_err(|e| (source_id, e))
    }

    async fn prepare_inner(&self, candidate: Candidate) -> Result<PreparedFile> {
        let doc = parse_document(&candidate.path, &candidate.source_id, &candidate.raw)?;
        let texts = self.chunker.chunk(&doc.body);

        let embedder = &self.embedder;
        let batch = &texts;
        let embeddings = self
            .retry
            .execute(move || async move { embedder.embed_batch(batch).await })
            .await?;
        if embeddings.len() != texts.len() {
            return Err(ForgeError::FatalGateway(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let chunks = build_chunks(&doc, &candidate.fingerprint, texts, embeddings);
        Ok(PreparedFile {
            source_id: candidate.source_id,
            fingerprint: candidate.fingerprint,
            chunks,
        })
    }

    async fn commit(
        &self,
        store: &mut dyn VectorStore,
        manifest: &mut Manifest,
        file: PreparedFile,
    ) -> Result<usize> {
        // Upsert before deleting: a failed write leaves the previous chunks
        // and their manifest entry consistent with each other.
        let ids: Vec<String> = file.chunks.iter().map(DocumentChunk::id).collect();
        let written = ids.len();
        store.add_documents(file.chunks).await?;

        if let Some(previous) = manifest.get(&file.source_id) {
            let stale: Vec<String> = previous
                .chunk_ids
                .iter()
                .filter(|id| !ids.contains(id))
                .cloned()
                .collect();
            if !stale.is_empty() {
                store.delete(&stale).await?;
            }
        }
        store.flush().await?;

        manifest.record(&file.source_id, file.fingerprint, ids);
        manifest.save(&self.manifest_path)?;
        Ok(written)
    }

    pub async fn stats(&self) -> Result<KnowledgeBaseStats> {
        let store = self.store.read().await;
        let manifest = Manifest::load(&self.manifest_path)?;
        Ok(KnowledgeBaseStats {
            documents: manifest.len(),
            chunks: store.count().await?,
            last_updated: manifest.updated_at,
        })
    }

    /// Clear the collection and forget every indexed file
    pub async fn reset(&self) -> Result<()> {
        let mut store = self.store.write().await;
        store.reset().await?;
        if self.manifest_path.exists() {
            fs::remove_file(&self.manifest_path).map_err(|e| {
                ForgeError::Storage(format!("{}: {}", self.manifest_path.display(), e))
            })?;
        }
        info!("Knowledge base reset");
        Ok(())
    }
}

fn build_chunks(
    doc: &SourceDocument,
    parent_ref: &str,
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
) -> Vec<DocumentChunk> {
    let total_chunks = texts.len();
    let doc_word_count = doc.word_count();
    texts
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(chunk_index, (text, embedding))| DocumentChunk {
            source_id: doc.source_id.clone(),
            title: doc.title.clone(),
            date: doc.date,
            categories: doc.categories.clone(),
            tags: doc.tags.clone(),
            chunk_index,
            total_chunks,
            text,
            embedding,
            parent_content_ref: parent_ref.to_string(),
            doc_word_count,
            excerpt: doc.excerpt.clone(),
        })
        .collect()
}

/// Markdown files under `root`, sorted, hidden directories skipped
pub fn scan_corpus(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("md") | Some("markdown")
            )
        })
        .collect();
    files.sort();
    files
}

/// Corpus-relative path with forward slashes
pub fn source_id_for(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
