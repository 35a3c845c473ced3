//! LLM Gateway
//!
//! Chat calls against a local generation service with bounded retry on
//! transient failures, optional token streaming for progress display and
//! prompt fitting against the model context window.

pub mod client;
pub mod llm;
pub mod retry;
pub mod scripted;
pub mod stream;

pub use client::{OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use llm::{GenerationParams, LlmGateway};
pub use retry::RetryPolicy;
pub use scripted::{ScriptedBackend, ScriptedReply};
pub use stream::{ChatChunk, NdjsonAssembler};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Receives streamed tokens as they arrive
pub type TokenSink = UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub stream: bool,
}

impl CompletionRequest {
    /// Content of the last user message
    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    pub fn system_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// A text-generation service
///
/// Implementations classify their failures: `TransientGateway` for
/// anything worth retrying, `FatalGateway` or `ModelNotFound` otherwise.
/// The returned text is always the fully assembled response; tokens go to
/// `sink` only for progress reporting.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: Option<&TokenSink>,
    ) -> Result<String>;

    fn model(&self) -> &str;
}
