//! Chat service: one engine turn plus transcript bookkeeping.
//!
//! The service assigns a session id, forwards every chunk of the turn
//! unchanged, and once the turn ends with `done` stores the user message
//! and the assembled assistant message in the background. Failures while
//! storing are logged. Only a failure to create the conversation shows up
//! in the stream, as its single `error` chunk.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::Stream;
use mcpflow_core::{ChunkKind, ConversationItem, Message, Role, ServerConfig, StreamChunk};
use mcpflow_providers::GenerationOptions;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::engine::{ChatEngine, TurnRequest, TurnStream, TurnTranscript};
use crate::transcript::TranscriptStore;

/// One chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Full conversation, ending with the new user message
    pub conversation: Vec<ConversationItem>,
    pub servers: Vec<ServerConfig>,
    pub options: GenerationOptions,
    /// Existing session to continue; a new id is generated when absent
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(conversation: Vec<ConversationItem>) -> Self {
        Self {
            conversation,
            ..Default::default()
        }
    }

    pub fn with_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Text of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.conversation.iter().rev().find_map(|item| match item {
            ConversationItem::Message {
                role: Role::User,
                content,
            } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Runs chat turns and records them.
#[derive(Clone)]
pub struct ChatService {
    engine: ChatEngine,
    store: Arc<dyn TranscriptStore>,
}

impl ChatService {
    pub fn new(engine: ChatEngine, store: Arc<dyn TranscriptStore>) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &Arc<dyn TranscriptStore> {
        &self.store
    }

    /// Start a chat turn.
    ///
    /// Never fails: if the conversation cannot be created, the stream holds
    /// a single `error` chunk of type `storage` and no turn runs.
    pub async fn stream_chat(&self, request: ChatRequest) -> ChatStream {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Err(e) = self.store.ensure_conversation(&session_id).await {
            error!(session_id = %session_id, error = %e, "Failed to create conversation");
            let chunk = StreamChunk::error(e.to_string(), e.category())
                .with_metadata("session_id", json!(session_id));
            return ChatStream {
                inner: TurnStream::terminated(chunk),
                transcript: TurnTranscript::default(),
                persist: None,
                session_id,
            };
        }
        debug!(session_id = %session_id, "Starting chat turn");

        let user_message = request.last_user_message().map(str::to_string);
        let show_thinking = request.options.show_thinking;

        let turn = TurnRequest::new(request.conversation)
            .with_servers(request.servers)
            .with_options(request.options)
            .with_session_id(session_id.clone());

        ChatStream {
            inner: self.engine.stream_turn(turn),
            transcript: TurnTranscript::default(),
            persist: Some(PendingPersist {
                store: Arc::clone(&self.store),
                session_id: session_id.clone(),
                user_message,
                show_thinking,
            }),
            session_id,
        }
    }
}

struct PendingPersist {
    store: Arc<dyn TranscriptStore>,
    session_id: String,
    user_message: Option<String>,
    show_thinking: bool,
}

impl PendingPersist {
    fn spawn(self, transcript: &TurnTranscript) {
        let mut assistant = Message::assistant(transcript.content.clone());
        if self.show_thinking {
            assistant = assistant.with_thinking_steps(transcript.thinking_steps.clone());
        }
        tokio::spawn(persist_turn(
            self.store,
            self.session_id,
            self.user_message,
            assistant,
        ));
    }
}

async fn persist_turn(
    store: Arc<dyn TranscriptStore>,
    session_id: String,
    user_message: Option<String>,
    assistant: Message,
) {
    if let Some(text) = user_message {
        if let Err(e) = store.append_message(&session_id, Message::user(text)).await {
            warn!(session_id = %session_id, error = %e, "Failed to store user message");
        }
    }
    if let Err(e) = store.append_message(&session_id, assistant).await {
        warn!(session_id = %session_id, error = %e, "Failed to store assistant message");
        return;
    }
    debug!(session_id = %session_id, "Chat turn stored");
}

/// Chunks of a chat turn, forwarded unchanged.
pub struct ChatStream {
    inner: TurnStream,
    session_id: String,
    transcript: TurnTranscript,
    persist: Option<PendingPersist>,
}

impl ChatStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// What has been streamed so far.
    pub fn transcript(&self) -> &TurnTranscript {
        &self.transcript
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl Stream for ChatStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let chunk = match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(chunk) => chunk,
            None => return Poll::Ready(None),
        };

        this.transcript.record(&chunk);
        if chunk.kind == ChunkKind::Done {
            if let Some(persist) = this.persist.take() {
                persist.spawn(&this.transcript);
            }
        }

        Poll::Ready(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_user_message() {
        let request = ChatRequest::new(vec![
            ConversationItem::system("be brief"),
            ConversationItem::user("first"),
            ConversationItem::assistant("answer"),
            ConversationItem::user("second"),
        ]);
        assert_eq!(request.last_user_message(), Some("second"));
        assert_eq!(ChatRequest::default().last_user_message(), None);
    }
}
