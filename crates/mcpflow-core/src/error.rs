//! Error types for mcpflow.
//!
//! The protocol and engine crates carry their own error enums; this is the
//! umbrella type used by configuration loading and by callers that want a
//! single error type across crates.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mcpflow.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool protocol error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Model backend error
    #[error("Model backend error: {0}")]
    Backend(String),

    /// Transcript storage error
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/mcpflow/config.toml"),
            Error::Mcp(_) => Some("Check that the tool server URL is reachable and speaks MCP"),
            Error::Backend(_) => Some("Check model.responses_url and the API key"),
            _ => None,
        }
    }
}

/// Render an error for the terminal, with a hint line when one exists.
pub fn format_error_with_suggestion(error: &Error) -> String {
    match error.recovery_suggestion() {
        Some(hint) => format!("{}\n  hint: {}", error, hint),
        None => error.to_string(),
    }
}
