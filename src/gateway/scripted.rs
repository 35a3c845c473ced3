//! Deterministic in-process backend
//!
//! Replies come from a queue, then from an optional responder closure.
//! Every request is recorded so callers can assert on prompts, attempt
//! counts and temperatures.

use super::{ChatBackend, CompletionRequest, TokenSink};
use crate::errors::{ForgeError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted outcome
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    Transient(String),
    Fatal(String),
    ModelNotFound,
    /// Never completes; used to exercise cancellation
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> ScriptedReply + Send + Sync>;

pub struct ScriptedBackend {
    model: String,
    queue: Mutex<VecDeque<ScriptedReply>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("model", &self.model)
            .field("queued", &self.remaining())
            .field("calls", &self.call_count())
            .finish()
    }
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            model: "scripted".to_string(),
            queue: Mutex::new(replies.into_iter().collect()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend that answers every request with `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> ScriptedReply + Send + Sync + 'static,
    {
        let mut backend = Self::new(Vec::new());
        backend.responder = Some(Box::new(responder));
        backend
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(reply);
        }
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn next_reply(&self, request: &CompletionRequest) -> ScriptedReply {
        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(request),
            (None, None) => ScriptedReply::Fatal("script exhausted".to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: Option<&TokenSink>,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        match self.next_reply(request) {
            ScriptedReply::Text(text) => {
                if let Some(sink) = sink {
                    for word in text.split_inclusive(' ') {
                        let _ = sink.send(word.to_string());
                    }
                }
                Ok(text)
            }
            ScriptedReply::Transient(msg) => Err(ForgeError::TransientGateway(msg)),
            ScriptedReply::Fatal(msg) => Err(ForgeError::FatalGateway(msg)),
            ScriptedReply::ModelNotFound => Err(ForgeError::ModelNotFound {
                model: self.model.clone(),
            }),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatMessage;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            temperature: 0.5,
            max_tokens: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn test_queue_then_responder() {
        let backend = ScriptedBackend::with_responder(|req| {
            ScriptedReply::text(format!("echo: {}", req.user_text()))
        });
        backend.push(ScriptedReply::text("queued"));

        assert_eq!(backend.complete(&request("a"), None).await.unwrap(), "queued");
        assert_eq!(backend.complete(&request("b"), None).await.unwrap(), "echo: b");
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.calls()[1].user_text(), "b");
    }

    #[tokio::test]
    async fn test_streams_to_sink_and_errors() {
        let backend = ScriptedBackend::new(vec![
            ScriptedReply::text("one two"),
            ScriptedReply::Transient("503".into()),
        ]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let text = backend.complete(&request("x"), Some(&tx)).await.unwrap();
        assert_eq!(text, "one two");
        assert_eq!(rx.recv().await.unwrap(), "one ");
        assert_eq!(rx.recv().await.unwrap(), "two");

        assert!(backend.complete(&request("x"), None).await.unwrap_err().is_transient());
        assert!(backend.complete(&request("x"), None).await.unwrap_err().is_fatal());
    }
}
