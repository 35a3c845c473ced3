//! Prompt assembly against the model context window
//!
//! A prompt is a system instruction, a task and a list of context blocks
//! ordered most relevant first. When the whole prompt plus the reserved
//! output tokens exceeds the window, context blocks are dropped from the
//! least relevant end until it fits.

use super::counter::TokenCounter;
use crate::errors::{ForgeError, Result};
use tracing::debug;

/// A stage prompt before it is turned into chat messages
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub task: String,
    /// Most relevant first
    pub context: Vec<String>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            task: task.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    /// User message text: context blocks first, then the task
    pub fn user_text(&self) -> String {
        if self.context.is_empty() {
            return self.task.clone();
        }
        let mut text = String::from("Reference material:\n\n");
        text.push_str(&self.context.join("\n\n"));
        text.push_str("\n\n---\n\n");
        text.push_str(&self.task);
        text
    }

    pub fn estimated_tokens(&self, counter: &TokenCounter) -> usize {
        counter.upper_bound(&self.system) + counter.upper_bound(&self.user_text())
    }
}

/// Fits prompts into a fixed context window
#[derive(Debug, Clone)]
pub struct ContextWindow {
    max_tokens: usize,
    counter: TokenCounter,
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            counter: TokenCounter::new(),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Drop least relevant context until the prompt plus `reserved_output`
    /// fits, or fail with `ContextOverflow` when even the bare prompt is
    /// too large
    pub fn fit(&self, mut prompt: Prompt, reserved_output: usize) -> Result<Prompt> {
        let limit = self.max_tokens.saturating_sub(reserved_output);
        let mut dropped = 0usize;

        while prompt.estimated_tokens(&self.counter) > limit {
            if prompt.context.pop().is_none() {
                return Err(ForgeError::ContextOverflow {
                    current: prompt.estimated_tokens(&self.counter) + reserved_output,
                    max: self.max_tokens,
                });
            }
            dropped += 1;
        }

        if dropped > 0 {
            debug!(dropped, remaining = prompt.context.len(), "Truncated prompt context");
        }
        Ok(prompt)
    }
}
