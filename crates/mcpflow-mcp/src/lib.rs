//! # mcpflow-mcp
//!
//! MCP (Model Context Protocol) client for mcpflow.
//!
//! This crate provides:
//! - JSON-RPC envelope encoding and JSON / event-stream body decoding
//! - HTTP transport for streamable-http servers
//! - Per-server sessions with a handshake, tool listing and tool calls
//! - A registry that merges many servers into one routed tool catalog

pub mod codec;
pub mod error;
pub mod naming;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use error::{McpError, TransportError};
pub use registry::{InitReport, ToolRegistry};
pub use session::{ServerSession, SessionSettings, SessionState, ToolDescriptor};
pub use transport::{Connector, HttpConnector, HttpTransport, RawResponse, Transport};
