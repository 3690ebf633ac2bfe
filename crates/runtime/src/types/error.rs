//! Error types for the Kiln runtime

use thiserror::Error;

pub use crate::config::ConfigError;

/// Main runtime error type
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a generation engine call.
///
/// The `Display` text of every variant except [`GenerationError::Cancelled`]
/// is what the client sees, either as a `500 {error}` body or inside an
/// `error` stream frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The caller's cancellation token fired. Never surfaced to the client.
    #[error("Generation cancelled")]
    Cancelled,

    #[error("No LLM provider configured. Set OPENROUTER_API_KEY, OPENAI_API_KEY, or KILN_LLM_BASE_URL.")]
    ProviderNotConfigured,

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode LLM stream: {0}")]
    Decode(String),

    /// Free-form engine failure; the message is passed through verbatim.
    #[error("{0}")]
    Engine(String),
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }
}

/// Workspace provisioning errors
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("IO error in workspace {path}: {message}")]
    Io { path: String, message: String },

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Workspace task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_message_is_passed_through() {
        let err = GenerationError::Engine("model exploded".to_string());
        assert_eq!(err.to_string(), "model exploded");
    }

    #[test]
    fn runtime_error_wraps_generation_error() {
        let err: RuntimeError = GenerationError::Api {
            status: 429,
            body: "slow down".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Generation error: LLM API error (429): slow down"
        );
    }

    #[test]
    fn only_cancelled_reports_cancellation() {
        assert!(GenerationError::Cancelled.is_cancelled());
        assert!(!GenerationError::ProviderNotConfigured.is_cancelled());
    }
}
