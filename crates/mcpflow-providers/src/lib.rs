//! # mcpflow-providers
//!
//! Streaming model backends for mcpflow.
//!
//! This crate provides:
//! - The `ModelBackend` trait and the closed `ModelEvent` set
//! - An SSE parser that tolerates arbitrary chunk boundaries
//! - A Responses-API backend

pub mod error;
pub mod responses;
pub mod sse;
pub mod traits;

pub use error::BackendError;
pub use responses::ResponsesBackend;
pub use traits::{
    CredentialProvider, GenerationOptions, GenerationRequest, ModelBackend, ModelEvent,
    ModelEventStream, StaticToken,
};
