//! Conversation transcript storage.

use std::collections::HashMap;

use async_trait::async_trait;
use mcpflow_core::Message;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from transcript storage.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TranscriptError {
    /// Stable category for `error_type` metadata.
    pub fn category(&self) -> &'static str {
        match self {
            TranscriptError::NotFound(_) => "not_found",
            TranscriptError::Storage(_) => "storage",
        }
    }
}

impl From<TranscriptError> for mcpflow_core::Error {
    fn from(e: TranscriptError) -> Self {
        mcpflow_core::Error::Transcript(e.to_string())
    }
}

/// Trait for transcript storage backends.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Create the conversation if it does not exist yet.
    async fn ensure_conversation(&self, session_id: &str) -> Result<(), TranscriptError>;

    /// Append a message to an existing conversation.
    async fn append_message(&self, session_id: &str, message: Message)
        -> Result<(), TranscriptError>;

    /// Messages of a conversation, oldest first.
    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, TranscriptError>;

    /// Delete a conversation. Returns whether it existed.
    async fn delete_conversation(&self, session_id: &str) -> Result<bool, TranscriptError>;
}

/// Process-local transcript storage.
#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn ensure_conversation(&self, session_id: &str) -> Result<(), TranscriptError> {
        self.conversations
            .write()
            .await
            .entry(session_id.to_string())
            .or_default();
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: &str,
        message: Message,
    ) -> Result<(), TranscriptError> {
        let mut conversations = self.conversations.write().await;
        let messages = conversations
            .get_mut(session_id)
            .ok_or_else(|| TranscriptError::NotFound(session_id.to_string()))?;
        messages.push(message);
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, TranscriptError> {
        self.conversations
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| TranscriptError::NotFound(session_id.to_string()))
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<bool, TranscriptError> {
        Ok(self.conversations.write().await.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_core::Role;

    #[tokio::test]
    async fn test_append_and_read() {
        let store = InMemoryTranscriptStore::new();
        store.ensure_conversation("s1").await.unwrap();
        store
            .append_message("s1", Message::user("hi"))
            .await
            .unwrap();
        store
            .append_message("s1", Message::assistant("hello"))
            .await
            .unwrap();

        let messages = store.messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = InMemoryTranscriptStore::new();
        store.ensure_conversation("s1").await.unwrap();
        store
            .append_message("s1", Message::user("hi"))
            .await
            .unwrap();
        store.ensure_conversation("s1").await.unwrap();

        assert_eq!(store.messages("s1").await.unwrap().len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let store = InMemoryTranscriptStore::new();
        assert!(matches!(
            store.append_message("nope", Message::user("hi")).await,
            Err(TranscriptError::NotFound(_))
        ));
        assert!(matches!(
            store.messages("nope").await,
            Err(TranscriptError::NotFound(_))
        ));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TranscriptError::Storage("db down".into()).category(), "storage");
        assert_eq!(TranscriptError::NotFound("s".into()).category(), "not_found");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryTranscriptStore::new();
        store.ensure_conversation("s1").await.unwrap();
        assert!(store.delete_conversation("s1").await.unwrap());
        assert!(!store.delete_conversation("s1").await.unwrap());
        assert!(store.is_empty().await);
    }
}
