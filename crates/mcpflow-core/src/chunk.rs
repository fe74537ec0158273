//! The unit of output produced by the streaming engine.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Kind of a [`StreamChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Reasoning text or tool activity
    Thinking,
    /// Answer text
    Content,
    /// Terminal chunk of a successful turn
    Done,
    /// Terminal chunk of a failed turn
    Error,
}

impl ChunkKind {
    /// Whether a chunk of this kind ends the stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkKind::Done | ChunkKind::Error)
    }
}

/// One chunk of the engine's ordered output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StreamChunk {
    fn new(kind: ChunkKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::new(ChunkKind::Thinking, content)
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self::new(ChunkKind::Content, content)
    }

    pub fn done() -> Self {
        Self::new(ChunkKind::Done, "")
    }

    /// Error chunk carrying the message and its category under `error_type`.
    pub fn error(message: impl Into<String>, error_type: &str) -> Self {
        Self::new(ChunkKind::Error, message).with_metadata("error_type", json!(error_type))
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Look up a metadata entry.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Render as a `data: <json>\n\n` event-stream frame.
    pub fn to_sse_frame(&self) -> String {
        let body = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_serialization() {
        let chunk = StreamChunk::content("hello");
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value, json!({"type": "content", "content": "hello"}));
    }

    #[test]
    fn test_error_chunk_carries_type() {
        let chunk = StreamChunk::error("bad things", "backend");
        assert!(chunk.is_terminal());
        assert_eq!(chunk.meta("error_type"), Some(&json!("backend")));
    }

    #[test]
    fn test_thinking_is_not_terminal() {
        assert!(!StreamChunk::thinking("hmm").is_terminal());
        assert!(StreamChunk::done().is_terminal());
    }

    #[test]
    fn test_sse_frame() {
        let frame = StreamChunk::done().with_metadata("rounds", json!(1)).to_sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#""type":"done""#));
    }
}
