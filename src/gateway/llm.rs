//! Gateway facade used by retrieval and the pipeline stages

use super::retry::RetryPolicy;
use super::{ChatBackend, ChatMessage, CompletionRequest, TokenSink};
use crate::context::{ContextWindow, Prompt};
use crate::errors::Result;
use std::sync::Arc;
use tracing::debug;

/// Per-call sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_tokens: usize) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Fits prompts to the window, then calls the backend under the retry policy
#[derive(Clone)]
pub struct LlmGateway {
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    window: ContextWindow,
    sink: Option<TokenSink>,
}

impl LlmGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, retry: RetryPolicy, window: ContextWindow) -> Self {
        Self {
            backend,
            retry,
            window,
            sink: None,
        }
    }

    /// Stream tokens to `sink` while calls are in flight
    pub fn with_progress(mut self, sink: TokenSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Fully assembled response text for `prompt`
    pub async fn generate(&self, prompt: Prompt, params: GenerationParams) -> Result<String> {
        let prompt = self.window.fit(prompt, params.max_tokens)?;
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user_text()),
            ],
            temperature: params.temperature,
            max_tokens: Some(params.max_tokens),
            stream: self.sink.is_some(),
        };
        debug!(
            model = %self.backend.model(),
            context_blocks = prompt.context.len(),
            temperature = params.temperature,
            "Gateway call"
        );

        let backend = &self.backend;
        let sink = self.sink.as_ref();
        let request = &request;
        self.retry
            .execute(move || async move { backend.complete(request, sink).await })
            .await
    }
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("model", &self.backend.model())
            .field("retry", &self.retry)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForgeError;
    use crate::gateway::{ScriptedBackend, ScriptedReply};

    fn gateway(backend: Arc<ScriptedBackend>, window: usize) -> LlmGateway {
        LlmGateway::new(backend, RetryPolicy::immediate(3), ContextWindow::new(window))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptedReply::Transient("connection refused".into()),
            ScriptedReply::Transient("timeout".into()),
            ScriptedReply::text("done"),
        ]));
        let gw = gateway(backend.clone(), 10_000);

        let out = gw
            .generate(Prompt::new("sys", "task"), GenerationParams::new(0.2, 100))
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedReply::ModelNotFound]));
        let gw = gateway(backend.clone(), 10_000);

        let err = gw
            .generate(Prompt::new("sys", "task"), GenerationParams::new(0.2, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ModelNotFound { .. }));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_context_truncated_before_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedReply::text("ok")]));
        let gw = gateway(backend.clone(), 300);
        let context = vec![
            format!("[S1] {}", "a".repeat(400)),
            format!("[S2] {}", "b".repeat(400)),
        ];

        gw.generate(
            Prompt::new("sys", "task").with_context(context),
            GenerationParams::new(0.2, 100),
        )
        .await
        .unwrap();

        let sent = backend.calls()[0].user_text().to_string();
        assert!(sent.contains("[S1]"));
        assert!(!sent.contains("[S2]"));
    }
}
