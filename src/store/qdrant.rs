//! Qdrant-backed vector store
//!
//! Point ids are UUIDv5 of the chunk id; the chunk id itself travels in
//! the payload so results can be re-sorted deterministically.

use super::{label_key, rank_order, ScoredChunk, SearchFilters, VectorStore};
use crate::errors::{ForgeError, Result};
use crate::types::DocumentChunk;
use async_trait::async_trait;
use chrono::DateTime;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, points_selector::PointsSelectorOneOf,
        r#match::MatchValue, value::Kind, vectors_config::Config, with_payload_selector::SelectorOptions,
        Condition, CreateCollection, Distance, FieldCondition, Filter, ListValue, Match, PointId,
        PointStruct, PointsIdsList, PointsSelector, Range, RepeatedStrings, SearchPoints,
        Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub struct QdrantStore {
    client: QdrantClient,
    collection: String,
    dimension: usize,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

fn storage<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> ForgeError + '_ {
    move |e| ForgeError::Storage(format!("{}: {}", context, e))
}

impl QdrantStore {
    /// Connect and create the collection if it does not exist yet
    pub async fn connect(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(storage("Failed to create Qdrant client"))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(storage("Failed to list collections"))?;
        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            info!(collection = %self.collection, dimension = self.dimension, "Creating collection");
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: self.dimension as u64,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(storage("Failed to create collection"))?;
        }
        Ok(())
    }

    fn build_filter(filters: &SearchFilters) -> Option<Filter> {
        let mut must = Vec::new();

        if !filters.categories.is_empty() {
            must.push(keywords_condition("category_keys", &filters.categories));
        }
        if !filters.tags.is_empty() {
            must.push(keywords_condition("tag_keys", &filters.tags));
        }
        if filters.date_from.is_some() || filters.date_to.is_some() {
            must.push(Condition {
                condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                    key: "timestamp".to_string(),
                    range: Some(Range {
                        gte: filters.date_from.map(|d| d.timestamp() as f64),
                        lte: filters.date_to.map(|d| d.timestamp() as f64),
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
            });
        }

        if must.is_empty() {
            None
        } else {
            Some(Filter {
                must,
                ..Default::default()
            })
        }
    }
}

fn keywords_condition(key: &str, values: &[String]) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keywords(RepeatedStrings {
                    strings: label_keys(values),
                })),
            }),
            ..Default::default()
        })),
    }
}

/// Keyword matches are exact in Qdrant, so filters run against lowercased
/// copies of the labels
fn label_keys(values: &[String]) -> Vec<String> {
    values.iter().map(|v| label_key(v)).collect()
}

pub(crate) fn point_uuid(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
}

fn string_list(values: &[String]) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::ListValue(ListValue {
            values: values.iter().cloned().map(QdrantValue::from).collect(),
        })),
    }
}

fn chunk_payload(chunk: &DocumentChunk) -> HashMap<String, QdrantValue> {
    let mut payload = HashMap::new();
    payload.insert("chunk_id".to_string(), QdrantValue::from(chunk.id()));
    payload.insert("source_id".to_string(), QdrantValue::from(chunk.source_id.clone()));
    payload.insert("title".to_string(), QdrantValue::from(chunk.title.clone()));
    payload.insert("date".to_string(), QdrantValue::from(chunk.date.to_rfc3339()));
    payload.insert("timestamp".to_string(), QdrantValue::from(chunk.date.timestamp()));
    payload.insert("categories".to_string(), string_list(&chunk.categories));
    payload.insert("tags".to_string(), string_list(&chunk.tags));
    payload.insert("category_keys".to_string(), string_list(&label_keys(&chunk.categories)));
    payload.insert("tag_keys".to_string(), string_list(&label_keys(&chunk.tags)));
    payload.insert("chunk_index".to_string(), QdrantValue::from(chunk.chunk_index as i64));
    payload.insert("total_chunks".to_string(), QdrantValue::from(chunk.total_chunks as i64));
    payload.insert("text".to_string(), QdrantValue::from(chunk.text.clone()));
    payload.insert(
        "parent_content_ref".to_string(),
        QdrantValue::from(chunk.parent_content_ref.clone()),
    );
    payload.insert("doc_word_count".to_string(), QdrantValue::from(chunk.doc_word_count as i64));
    if let Some(excerpt) = &chunk.excerpt {
        payload.insert("excerpt".to_string(), QdrantValue::from(excerpt.clone()));
    }
    payload
}

fn payload_str(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        Kind::DoubleValue(f) => Some(*f as i64),
        _ => None,
    }
}

fn payload_list(payload: &HashMap<String, QdrantValue>, key: &str) -> Vec<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::ListValue(list)) => list
            .values
            .iter()
            .filter_map(|v| match v.kind.as_ref() {
                Some(Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<DocumentChunk> {
    let date = DateTime::parse_from_rfc3339(&payload_str(payload, "date")?).ok()?;
    Some(DocumentChunk {
        source_id: payload_str(payload, "source_id")?,
        title: payload_str(payload, "title").unwrap_or_default(),
        date,
        categories: payload_list(payload, "categories"),
        tags: payload_list(payload, "tags"),
        chunk_index: payload_int(payload, "chunk_index")? as usize,
        total_chunks: payload_int(payload, "total_chunks").unwrap_or(0) as usize,
        text: payload_str(payload, "text").unwrap_or_default(),
        // Vectors are not fetched back from the server
        embedding: Vec::new(),
        parent_content_ref: payload_str(payload, "parent_content_ref").unwrap_or_default(),
        doc_word_count: payload_int(payload, "doc_word_count").unwrap_or(0) as usize,
        excerpt: payload_str(payload, "excerpt"),
    })
}

fn describe_point(point_id: &Option<PointId>) -> String {
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => "unknown".to_string(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add_documents(&mut self, chunks: Vec<DocumentChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|chunk| {
                PointStruct::new(
                    point_uuid(&chunk.id()),
                    chunk.embedding.clone(),
                    chunk_payload(chunk),
                )
            })
            .collect();

        self.client
            .upsert_points_blocking(&self.collection, None, points, None)
            .await
            .map_err(storage("Failed to upsert points"))?;
        Ok(())
    }

    async fn delete(&mut self, chunk_ids: &[String]) -> Result<usize> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        let ids = chunk_ids
            .iter()
            .map(|id| PointId::from(point_uuid(id)))
            .collect();
        self.client
            .delete_points(
                &self.collection,
                None,
                &PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList { ids })),
                },
                None,
            )
            .await
            .map_err(storage("Failed to delete points"))?;
        Ok(chunk_ids.len())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: embedding.to_vec(),
                limit: k as u64,
                filter: Self::build_filter(filters),
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(storage("Failed to search points"))?;

        let mut results: Vec<ScoredChunk> = response
            .result
            .into_iter()
            .filter_map(|point| match chunk_from_payload(&point.payload) {
                Some(chunk) => Some(ScoredChunk {
                    chunk,
                    score: point.score,
                }),
                None => {
                    debug!(point = %describe_point(&point.id), "Skipping point with incomplete payload");
                    None
                }
            })
            .collect();

        results.sort_by(rank_order);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(storage("Failed to get collection info"))?;
        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }

    async fn reset(&mut self) -> Result<()> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(storage("Failed to delete collection"))?;
        self.ensure_collection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ids_are_stable_uuids() {
        let a = point_uuid("posts/a.md#00000");
        assert_eq!(a, point_uuid("posts/a.md#00000"));
        assert_ne!(a, point_uuid("posts/a.md#00001"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_payload_round_trip() {
        let chunk = DocumentChunk {
            source_id: "posts/a.md".into(),
            title: "A".into(),
            date: DateTime::parse_from_rfc3339("2024-02-03T04:05:06+01:00").unwrap(),
            categories: vec!["eng".into()],
            tags: vec!["rust".into(), "async".into()],
            chunk_index: 3,
            total_chunks: 7,
            text: "body".into(),
            embedding: vec![0.1, 0.2],
            parent_content_ref: "f00".into(),
            doc_word_count: 900,
            excerpt: Some("An excerpt".into()),
        };
        let back = chunk_from_payload(&chunk_payload(&chunk)).unwrap();
        assert_eq!(back.id(), chunk.id());
        assert_eq!(back.tags, chunk.tags);
        assert_eq!(back.date, chunk.date);
        assert_eq!(back.excerpt, chunk.excerpt);
        assert!(back.embedding.is_empty());
    }

    #[test]
    fn test_filter_construction() {
        assert!(QdrantStore::build_filter(&SearchFilters::none()).is_none());
        let filters = SearchFilters {
            tags: vec!["rust".into()],
            date_from: Some(DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap()),
            ..Default::default()
        };
        assert_eq!(QdrantStore::build_filter(&filters).unwrap().must.len(), 2);
    }

    #[test]
    fn test_label_filters_ignore_case() {
        let chunk = DocumentChunk {
            source_id: "posts/a.md".into(),
            title: "A".into(),
            date: DateTime::parse_from_rfc3339("2024-02-03T04:05:06+01:00").unwrap(),
            categories: vec!["Engineering".into()],
            tags: vec!["Rust".into()],
            chunk_index: 0,
            total_chunks: 1,
            text: "body".into(),
            embedding: vec![],
            parent_content_ref: "f00".into(),
            doc_word_count: 1,
            excerpt: None,
        };
        let payload = chunk_payload(&chunk);
        assert_eq!(payload_list(&payload, "tag_keys"), vec!["rust"]);
        assert_eq!(payload_list(&payload, "category_keys"), vec!["engineering"]);
        assert_eq!(chunk_from_payload(&payload).unwrap().tags, vec!["Rust"]);

        let filters = SearchFilters {
            tags: vec!["RUST".into()],
            ..Default::default()
        };
        assert!(filters.matches(&chunk));
        let filter = QdrantStore::build_filter(&filters).unwrap();
        match &filter.must[0].condition_one_of {
            Some(ConditionOneOf::Field(field)) => {
                assert_eq!(field.key, "tag_keys");
                let wanted = field.r#match.as_ref().and_then(|m| m.match_value.clone());
                assert_eq!(
                    wanted,
                    Some(MatchValue::Keywords(RepeatedStrings {
                        strings: vec!["rust".to_string()]
                    }))
                );
            }
            other => panic!("unexpected condition {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore] // requires a running Qdrant
    async fn test_live_upsert_and_search() {
        let mut store = QdrantStore::connect("http://localhost:6334", "blogforge_test", 2)
            .await
            .unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
