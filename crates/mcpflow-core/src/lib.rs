//! # mcpflow-core
//!
//! Core types shared by the mcpflow crates.
//!
//! This crate provides:
//! - Conversation items and transcript messages
//! - Tool call request/result types and the model-facing tool projection
//! - The stream chunk emitted by the engine
//! - Configuration system
//! - Common error types

pub mod chunk;
pub mod config;
pub mod error;
pub mod message;
pub mod tool;

pub use chunk::{ChunkKind, StreamChunk};
pub use config::{Config, ReasoningEffort, ServerConfig, TransportKind, Verbosity};
pub use error::{Error, Result};
pub use message::{ConversationItem, Message, Role, ThinkingStep};
pub use tool::{FunctionTool, ToolCallRequest, ToolCallResult};
