//! Engine error types.

use mcpflow_providers::BackendError;
use thiserror::Error;

/// Errors that end a turn.
///
/// None of these reach the caller directly; the engine turns them into the
/// terminal `error` chunk, using [`EngineError::category`] as `error_type`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The backend refused to start a generation.
    #[error("Model backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// The backend stream failed mid-response.
    #[error("Model stream error: {0}")]
    Stream(#[source] anyhow::Error),

    /// The turn was cancelled.
    #[error("Turn cancelled")]
    Cancelled,

    /// The consumer dropped the output stream.
    #[error("Output stream closed by consumer")]
    Disconnected,

    /// A panic escaped the loop.
    #[error("Internal error: {0}")]
    Panic(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Short category name, reported as `error_type`.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Backend(e) => backend_category(e).unwrap_or("backend"),
            EngineError::Stream(e) => backend_category(e).unwrap_or("stream"),
            EngineError::Cancelled => "cancelled",
            EngineError::Disconnected => "disconnected",
            EngineError::Panic(_) => "internal",
        }
    }
}

fn backend_category(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<BackendError>().map(BackendError::category)
}

impl From<EngineError> for mcpflow_core::Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Backend(_) | EngineError::Stream(_) => {
                mcpflow_core::Error::Backend(e.to_string())
            }
            other => mcpflow_core::Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_uses_backend_error() {
        let err = EngineError::Backend(
            BackendError::Api {
                status: 429,
                message: "slow down".into(),
            }
            .into(),
        );
        assert_eq!(err.category(), "rate_limited");
    }

    #[test]
    fn test_category_fallbacks() {
        assert_eq!(
            EngineError::Backend(anyhow::anyhow!("boom")).category(),
            "backend"
        );
        assert_eq!(
            EngineError::Stream(anyhow::anyhow!("reset")).category(),
            "stream"
        );
        assert_eq!(EngineError::Cancelled.category(), "cancelled");
        assert_eq!(EngineError::Panic("x".into()).category(), "internal");
    }

    #[test]
    fn test_display() {
        let err = EngineError::Stream(anyhow::anyhow!("connection reset"));
        assert_eq!(err.to_string(), "Model stream error: connection reset");
    }
}
