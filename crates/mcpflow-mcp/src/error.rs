//! MCP-specific error types.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or its body not read.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP client gave up waiting.
    #[error("request timed out")]
    Timeout,

    /// Transport has already been closed.
    #[error("not connected")]
    NotConnected,

    /// Connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The initialize handshake failed.
    #[error("handshake with {server} failed: {reason}")]
    Handshake { server: String, reason: String },

    /// tools/list failed.
    #[error("listing tools from {server} failed: {reason}")]
    Listing { server: String, reason: String },

    /// The tool ran but reported an error.
    #[error("tool '{tool}' failed: {detail}")]
    ToolExecution { tool: String, detail: String },

    /// No server registered this qualified name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Server returned a JSON-RPC error object.
    #[error("server error (code {code}): {message}")]
    Server { code: i64, message: String },

    /// Protocol-level error (malformed messages, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session was already closed.
    #[error("session closed")]
    SessionClosed,
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from a JSON-RPC error object.
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Wrap a failure that happened during the handshake.
    pub fn handshake(server: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Handshake {
            server: server.into(),
            reason: cause.to_string(),
        }
    }

    /// Wrap a failure that happened while listing tools.
    pub fn listing(server: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Listing {
            server: server.into(),
            reason: cause.to_string(),
        }
    }

    /// Short category name, used when reporting errors to callers.
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Handshake { .. } => "handshake",
            McpError::Listing { .. } => "listing",
            McpError::ToolExecution { .. } => "tool_execution",
            McpError::UnknownTool(_) => "unknown_tool",
            McpError::Transport(_) => "transport",
            McpError::Timeout(_) => "timeout",
            McpError::Server { .. } => "server",
            McpError::Protocol(_) | McpError::Json(_) => "protocol",
            McpError::SessionClosed => "session_closed",
        }
    }
}

impl From<McpError> for mcpflow_core::Error {
    fn from(e: McpError) -> Self {
        mcpflow_core::Error::Mcp(e.to_string())
    }
}
