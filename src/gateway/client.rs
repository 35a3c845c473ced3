//! Ollama chat client
//!
//! - Endpoint: POST /api/chat (NDJSON when streaming)
//! - Connection failures, timeouts and 5xx are transient
//! - 404 means the model is not installed; other 4xx are fatal

use super::stream::{ChatChunk, NdjsonAssembler};
use super::{ChatBackend, ChatMessage, CompletionRequest, TokenSink};
use crate::config::OllamaConfig;
use crate::errors::{ForgeError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default chat model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Ollama chat client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }

    pub fn with_config(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self> {
        Self::with_config(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Names of the installed models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            return Err(ForgeError::TransientGateway(format!(
                "Failed to retrieve model list: HTTP {}",
                response.status()
            )));
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::FatalGateway(format!("Failed to parse models: {}", e)))?;

        Ok(models.models.into_iter().map(|m| m.name).collect())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: request.stream,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_status(status, &error_text, &self.model))
    }

    async fn read_stream(
        &self,
        response: reqwest::Response,
        sink: Option<&TokenSink>,
    ) -> Result<String> {
        let mut assembler = NdjsonAssembler::new();
        let mut text = String::new();
        let mut stream = response.bytes_stream();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes
                .map_err(|e| ForgeError::TransientGateway(format!("Stream interrupted: {}", e)))?;
            for chunk in assembler.push(&bytes)? {
                if self.absorb(chunk, &mut text, sink)? {
                    return Ok(text);
                }
            }
        }
        if let Some(chunk) = assembler.finish()? {
            self.absorb(chunk, &mut text, sink)?;
        }
        Ok(text)
    }

    /// Append one chunk; returns true once the service reports completion
    fn absorb(&self, chunk: ChatChunk, text: &mut String, sink: Option<&TokenSink>) -> Result<bool> {
        if let Some(error) = chunk.error {
            return Err(classify_body_error(&error, &self.model));
        }
        let content = chunk.content();
        if !content.is_empty() {
            text.push_str(content);
            if let Some(sink) = sink {
                // A closed receiver only means nobody is watching progress
                let _ = sink.send(content.to_string());
            }
        }
        Ok(chunk.done)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        sink: Option<&TokenSink>,
    ) -> Result<String> {
        debug!(model = %self.model, stream = request.stream, "Sending chat request");
        let response = self.send(request).await?;

        if request.stream {
            return self.read_stream(response, sink).await;
        }

        let body: ChatChunk = response
            .json()
            .await
            .map_err(|e| ForgeError::TransientGateway(format!("Failed to read response: {}", e)))?;
        if let Some(error) = body.error {
            return Err(classify_body_error(&error, &self.model));
        }
        Ok(body.content().to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub(crate) fn classify_send_error(e: reqwest::Error) -> ForgeError {
    if e.is_builder() {
        ForgeError::FatalGateway(format!("Malformed request: {}", e))
    } else {
        ForgeError::TransientGateway(format!("Failed to send request: {}", e))
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str, model: &str) -> ForgeError {
    if status == StatusCode::NOT_FOUND {
        ForgeError::ModelNotFound {
            model: model.to_string(),
        }
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        ForgeError::TransientGateway(format!("HTTP {}: {}", status, body))
    } else {
        ForgeError::FatalGateway(format!("HTTP {}: {}", status, body))
    }
}

fn classify_body_error(error: &str, model: &str) -> ForgeError {
    if error.contains("not found") {
        ForgeError::ModelNotFound {
            model: model.to_string(),
        }
    } else {
        ForgeError::FatalGateway(error.to_string())
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}
