//! # mcpflow-engine
//!
//! Streaming tool-call loop for mcpflow.
//!
//! This crate provides:
//! - The bounded, multi-round tool-call loop
//! - `ChatEngine`, which runs one turn in the background and hands back a
//!   stream of chunks
//! - The `ToolExecutor` seam between the loop and the tool registry
//! - `ChatService` with transcript persistence

pub mod accumulator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod service;
pub mod transcript;

pub use accumulator::ToolCallAccumulator;
pub use engine::{
    collect_turn, ChatEngine, ChunkSink, EngineSettings, LoopOutcome, ToolLoop, TurnRequest,
    TurnStream, TurnTranscript,
};
pub use error::{EngineError, EngineResult};
pub use executor::ToolExecutor;
pub use service::{ChatRequest, ChatService, ChatStream};
pub use transcript::{InMemoryTranscriptStore, TranscriptError, TranscriptStore};
