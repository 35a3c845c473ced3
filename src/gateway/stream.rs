//! Incremental NDJSON assembly for streamed chat responses
//!
//! Ollama streams one JSON object per line. Network chunks split lines at
//! arbitrary byte offsets, so bytes are buffered until a newline completes
//! an object.

use crate::errors::{ForgeError, Result};
use serde::Deserialize;

/// Maximum bytes buffered without a newline (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// One line of a streamed `/api/chat` response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

impl ChatChunk {
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// Line-buffered NDJSON parser
#[derive(Debug)]
pub struct NdjsonAssembler {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl Default for NdjsonAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonAssembler {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes and return every chunk completed by them, in order
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ChatChunk>> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(ForgeError::TransientGateway(format!(
                "Stream buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(chunk) = Self::parse_line(&line)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// Parse whatever remains once the stream has ended
    pub fn finish(&mut self) -> Result<Option<ChatChunk>> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_line(&rest)
    }

    fn parse_line(line: &[u8]) -> Result<Option<ChatChunk>> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(text).map(Some).map_err(|e| {
            ForgeError::TransientGateway(format!("Malformed stream line: {}", e))
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}
