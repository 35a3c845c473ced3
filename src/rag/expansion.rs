//! Query expansion through the gateway
//!
//! The model is asked for `n` alternative phrasings, one per line. Output
//! that yields nothing usable, or a non-fatal gateway failure, degrades to
//! searching with the original query alone.

use crate::context::Prompt;
use crate::errors::{ForgeError, Result};
use crate::gateway::{GenerationParams, LlmGateway};
use regex::Regex;
use tracing::{debug, warn};

const EXPANSION_SYSTEM: &str =
    "You write search queries for a semantic search engine over a technical blog.";

#[derive(Debug, Clone)]
pub struct QueryExpander {
    gateway: LlmGateway,
    expansions: usize,
    temperature: f32,
    list_marker: Regex,
}

impl QueryExpander {
    pub fn new(gateway: LlmGateway, expansions: usize, temperature: f32) -> Result<Self> {
        let list_marker = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*")
            .map_err(|e| ForgeError::Config(format!("bad list pattern: {}", e)))?;
        Ok(Self {
            gateway,
            expansions,
            temperature,
            list_marker,
        })
    }

    /// The original query followed by up to `expansions` paraphrases
    pub async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let query = query.trim().to_string();
        if self.expansions == 0 {
            return Ok(vec![query]);
        }

        let task = format!(
            "Generate {n} different search queries that would help find relevant information about: \"{query}\"\n\n\
             Cover related subtopics, different phrasings, long-tail keywords and semantic variations.\n\
             Return only the queries, one per line, no numbering or bullets.",
            n = self.expansions,
            query = query
        );
        let params = GenerationParams::new(self.temperature, 256);

        let response = match self.gateway.generate(Prompt::new(EXPANSION_SYSTEM, task), params).await {
            Ok(text) => text,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Query expansion failed, using original query");
                return Ok(vec![query]);
            }
        };

        let mut queries = vec![query.clone()];
        for line in response.lines() {
            if queries.len() > self.expansions {
                break;
            }
            let cleaned = self.clean_line(line);
            if cleaned.is_empty() || queries.iter().any(|q| q.eq_ignore_ascii_case(&cleaned)) {
                continue;
            }
            queries.push(cleaned);
        }

        if queries.len() == 1 {
            warn!("Query expansion returned nothing usable, using original query");
        }
        debug!(count = queries.len(), "Expanded query");
        Ok(queries)
    }

    fn clean_line(&self, line: &str) -> String {
        let stripped = self.list_marker.replace(line, "");
        stripped
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextWindow;
    use crate::gateway::{RetryPolicy, ScriptedBackend, ScriptedReply};
    use std::sync::Arc;

    fn expander(backend: Arc<ScriptedBackend>, n: usize) -> QueryExpander {
        let gateway =
            LlmGateway::new(backend, RetryPolicy::immediate(2), ContextWindow::new(8000));
        QueryExpander::new(gateway, n, 0.3).unwrap()
    }

    #[tokio::test]
    async fn test_expansion_cleans_and_caps() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedReply::text(
            "1. \"agent orchestration patterns\"\n- building agentic workflows\n\n* tool calling loops\nLLM planning\nextra line",
        )]));
        let queries = expander(backend.clone(), 3)
            .expand("Building Agentic Workflows")
            .await
            .unwrap();

        assert_eq!(
            queries,
            vec![
                "Building Agentic Workflows",
                "agent orchestration patterns",
                "tool calling loops",
                "LLM planning",
            ]
        );
        assert!((backend.calls()[0].temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_transient_failure_falls_back_to_query() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptedReply::Transient("down".into()),
            ScriptedReply::Transient("down".into()),
        ]));
        let queries = expander(backend, 3).expand("topic").await.unwrap();
        assert_eq!(queries, vec!["topic"]);
    }

    #[tokio::test]
    async fn test_fatal_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedReply::ModelNotFound]));
        assert!(expander(backend, 3).expand("topic").await.is_err());
    }

    #[tokio::test]
    async fn test_zero_expansions_skips_gateway() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let queries = expander(backend.clone(), 0).expand("topic").await.unwrap();
        assert_eq!(queries, vec!["topic"]);
        assert_eq!(backend.call_count(), 0);
    }
}
