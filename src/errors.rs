//! Error types for blogforge
//!
//! One variant per failure class the pipeline distinguishes. The class
//! decides what happens next: parse errors skip a file, transient gateway
//! errors are retried, fatal gateway errors abort, validation errors feed
//! the corrective retry loop and storage errors stop ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the blogforge engine
#[derive(Error, Debug)]
pub enum ForgeError {
    /// A single corpus file could not be parsed; ingestion continues
    #[error("Failed to parse {path}: {reason}")]
    RecoverableParse { path: PathBuf, reason: String },

    /// Connection refused, timeout or 5xx from the generation service
    #[error("Transient gateway error: {0}")]
    TransientGateway(String),

    /// Malformed request or any other non-retryable gateway failure
    #[error("Fatal gateway error: {0}")]
    FatalGateway(String),

    /// The configured model is not installed in the generation service
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },

    /// Transient failures persisted past the retry bound
    #[error("Gateway failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Generated output broke a stage or post contract
    #[error("Validation failed ({code}): {detail}")]
    Validation { code: String, detail: String },

    /// Vector store or manifest persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Prompt cannot be made to fit the model window
    #[error("Context window overflow: {current} tokens exceeds maximum {max} tokens")]
    ContextOverflow { current: usize, max: usize },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline moved along an edge its state machine does not have
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// The caller cancelled the request
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for blogforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Shorthand for a contract violation
    pub fn validation(code: impl Into<String>, detail: impl Into<String>) -> Self {
        ForgeError::Validation {
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// Errors worth another attempt against the gateway
    pub fn is_transient(&self) -> bool {
        matches!(self, ForgeError::TransientGateway(_))
    }

    /// Errors that abort the whole run without any retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForgeError::FatalGateway(_)
                | ForgeError::ModelNotFound { .. }
                | ForgeError::ContextOverflow { .. }
                | ForgeError::Config(_)
                | ForgeError::InvalidTransition { .. }
                | ForgeError::Cancelled
        )
    }

    /// Short machine-readable reason, used in failure diagnostics
    pub fn reason_code(&self) -> String {
        match self {
            ForgeError::RecoverableParse { .. } => "parse_error".to_string(),
            ForgeError::TransientGateway(_) => "gateway_transient".to_string(),
            ForgeError::FatalGateway(_) => "gateway_fatal".to_string(),
            ForgeError::ModelNotFound { .. } => "model_not_found".to_string(),
            ForgeError::RetriesExhausted { .. } => "gateway_retries_exhausted".to_string(),
            ForgeError::Validation { code, .. } => code.clone(),
            ForgeError::Storage(_) => "storage_error".to_string(),
            ForgeError::ContextOverflow { .. } => "context_overflow".to_string(),
            ForgeError::Config(_) => "config_error".to_string(),
            ForgeError::InvalidTransition { .. } => "invalid_transition".to_string(),
            ForgeError::Cancelled => "cancelled".to_string(),
            ForgeError::Io(_) => "io_error".to_string(),
            ForgeError::Serialization(_) => "serialization_error".to_string(),
            ForgeError::Yaml(_) => "yaml_error".to_string(),
        }
    }
}

/// Convert anyhow errors raised at the embedding edge
impl From<anyhow::Error> for ForgeError {
    fn from(err: anyhow::Error) -> Self {
        ForgeError::FatalGateway(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForgeError::ContextOverflow {
            current: 9000,
            max: 8000,
        };
        assert!(err.to_string().contains("9000"));
        assert!(err.to_string().contains("8000"));
    }

    #[test]
    fn test_classification() {
        assert!(ForgeError::TransientGateway("timeout".into()).is_transient());
        assert!(!ForgeError::TransientGateway("timeout".into()).is_fatal());
        assert!(ForgeError::ModelNotFound { model: "x".into() }.is_fatal());
        assert!(!ForgeError::validation("word_count_below_minimum", "too short").is_fatal());
        assert!(!ForgeError::Storage("down".into()).is_transient());
    }

    #[test]
    fn test_reason_code_uses_validation_code() {
        let err = ForgeError::validation("word_count_below_minimum", "412 < 800");
        assert_eq!(err.reason_code(), "word_count_below_minimum");
        assert!(err.to_string().contains("412 < 800"));
    }
}
