//! Backend error types.
//!
//! Backends return `anyhow::Error`; these are the typed causes callers can
//! downcast to when they need to tell failures apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// No API key or token could be found.
    #[error("model backend is not configured: {0}")]
    NotConfigured(String),

    /// The backend rejected the request.
    #[error("model API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The backend reported a failure inside the stream.
    #[error("model response failed: {0}")]
    ResponseFailed(String),

    /// The byte stream broke mid-response.
    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// Short category name, used when reporting errors to callers.
    pub fn category(&self) -> &'static str {
        match self {
            BackendError::NotConfigured(_) => "not_configured",
            BackendError::Api { status: 429, .. } => "rate_limited",
            BackendError::Api { .. } => "api_error",
            BackendError::ResponseFailed(_) => "response_failed",
            BackendError::Stream(_) => "stream_error",
        }
    }
}

impl From<BackendError> for mcpflow_core::Error {
    fn from(e: BackendError) -> Self {
        mcpflow_core::Error::Backend(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_and_category() {
        let err = BackendError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "model API error: 429 - slow down");
        assert_eq!(err.category(), "rate_limited");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = BackendError::ResponseFailed("server_error".to_string()).into();
        let backend = err.downcast_ref::<BackendError>().unwrap();
        assert_eq!(backend.category(), "response_failed");
    }
}
