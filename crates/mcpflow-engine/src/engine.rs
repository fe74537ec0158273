//! The streaming tool-call loop.
//!
//! A turn is a bounded sequence of rounds. Each round streams one generation
//! from the backend, forwards reasoning and answer text as chunks, and
//! collects the tool calls the model asks for. Calls run one at a time and
//! their outputs are appended to the conversation before the next round.
//!
//! [`ChatEngine::stream_turn`] runs a whole turn in a background task,
//! including building and closing the tool registry, and hands back a
//! [`TurnStream`] that always ends with exactly one `done` or `error` chunk.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use mcpflow_core::{
    ChunkKind, Config, ConversationItem, FunctionTool, ServerConfig, StreamChunk, ThinkingStep,
    ToolCallRequest, ToolCallResult,
};
use mcpflow_mcp::protocol::ClientInfo;
use mcpflow_mcp::{Connector, SessionSettings, ToolRegistry};
use mcpflow_providers::{GenerationOptions, GenerationRequest, ModelBackend, ModelEvent};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accumulator::ToolCallAccumulator;
use crate::error::{EngineError, EngineResult};
use crate::executor::ToolExecutor;

/// Default number of model rounds per turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

// ============================================================================
// Settings and Requests
// ============================================================================

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum number of model rounds per turn
    pub max_tool_rounds: usize,
    /// Settings for every tool server session opened during a turn
    pub session: SessionSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            session: SessionSettings::default(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_tool_rounds: config.engine.max_tool_rounds.max(1),
            session: SessionSettings {
                protocol_version: config.mcp.protocol_version.clone(),
                client_info: ClientInfo {
                    name: config.mcp.client_name.clone(),
                    version: config.mcp.client_version.clone(),
                },
                request_timeout: Duration::from_secs(config.engine.tool_timeout_secs),
            },
        }
    }
}

/// Everything one turn needs.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub conversation: Vec<ConversationItem>,
    /// Tool servers for this turn; empty disables tool calling
    pub servers: Vec<ServerConfig>,
    pub options: GenerationOptions,
    /// Echoed in the `done` chunk
    pub session_id: Option<String>,
}

impl TurnRequest {
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
}

/// Counters for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Backend requests made
    pub rounds: usize,
    /// Characters of answer text emitted
    pub content_length: usize,
    /// Thinking chunks emitted, tool activity included
    pub thinking_steps: usize,
    /// Tool calls executed
    pub tool_calls: usize,
}

impl LoopOutcome {
    /// The terminal `done` chunk for this outcome.
    pub fn to_done_chunk(&self, session_id: Option<&str>) -> StreamChunk {
        let mut chunk = StreamChunk::done()
            .with_metadata("content_length", json!(self.content_length))
            .with_metadata("total_thinking_steps", json!(self.thinking_steps))
            .with_metadata("rounds", json!(self.rounds))
            .with_metadata("tool_calls", json!(self.tool_calls));
        if let Some(id) = session_id {
            chunk = chunk.with_metadata("session_id", json!(id));
        }
        chunk
    }
}

// ============================================================================
// Chunk Sink
// ============================================================================

/// Producer side of a turn's output.
///
/// Accepts at most one terminal chunk; anything after it is dropped.
pub struct ChunkSink {
    tx: mpsc::UnboundedSender<StreamChunk>,
    cancel: CancellationToken,
    terminated: bool,
}

impl ChunkSink {
    pub fn new(tx: mpsc::UnboundedSender<StreamChunk>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            terminated: false,
        }
    }

    /// Send one chunk.
    ///
    /// Non-terminal chunks fail with `Cancelled` once the turn is cancelled,
    /// and with `Disconnected` once the consumer is gone.
    pub fn emit(&mut self, chunk: StreamChunk) -> EngineResult<()> {
        if self.terminated {
            debug!(kind = ?chunk.kind, "Dropping chunk after terminal chunk");
            return Ok(());
        }
        if !chunk.is_terminal() && self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.terminated = chunk.is_terminal();
        self.tx.send(chunk).map_err(|_| EngineError::Disconnected)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

// ============================================================================
// Tool Loop
// ============================================================================

/// The bounded multi-round loop over one backend.
pub struct ToolLoop<'a> {
    backend: &'a dyn ModelBackend,
    executor: Option<&'a dyn ToolExecutor>,
    tools: Vec<FunctionTool>,
    options: GenerationOptions,
    max_rounds: usize,
}

impl<'a> ToolLoop<'a> {
    /// A loop without tools.
    pub fn new(backend: &'a dyn ModelBackend, options: GenerationOptions) -> Self {
        Self {
            backend,
            executor: None,
            tools: Vec::new(),
            options,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Offer `tools` to the model and run its calls through `executor`.
    pub fn with_tools(mut self, executor: &'a dyn ToolExecutor, tools: Vec<FunctionTool>) -> Self {
        self.executor = Some(executor);
        self.tools = tools;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Run rounds until the model stops calling tools or the budget runs
    /// out. Tool calls and outputs are appended to `conversation`.
    pub async fn run(
        &self,
        conversation: &mut Vec<ConversationItem>,
        sink: &mut ChunkSink,
    ) -> EngineResult<LoopOutcome> {
        let mut outcome = LoopOutcome::default();

        for round in 1..=self.max_rounds {
            outcome.rounds = round;
            debug!(
                backend = self.backend.id(),
                round,
                items = conversation.len(),
                "Starting model round"
            );

            let calls = self.stream_round(conversation, sink, &mut outcome).await?;
            if calls.is_empty() {
                break;
            }

            let executor = match self.executor {
                Some(executor) => executor,
                None => {
                    debug!(calls = calls.len(), "Tool calls requested with no executor");
                    break;
                }
            };

            self.execute_calls(executor, calls, conversation, sink, &mut outcome)
                .await?;

            if round == self.max_rounds {
                warn!(
                    max_rounds = self.max_rounds,
                    "Round budget exhausted, last tool outputs were not sent to the model"
                );
            }
        }

        Ok(outcome)
    }

    /// Stream one generation and return the tool calls it finished.
    async fn stream_round(
        &self,
        conversation: &[ConversationItem],
        sink: &mut ChunkSink,
        outcome: &mut LoopOutcome,
    ) -> EngineResult<Vec<ToolCallRequest>> {
        let request = GenerationRequest {
            input: conversation.to_vec(),
            tools: self.tools.clone(),
            options: self.options.clone(),
        };

        let mut stream = self
            .backend
            .stream(request)
            .await
            .map_err(EngineError::Backend)?;
        let cancel = sink.cancellation().clone();
        let mut calls = ToolCallAccumulator::new();
        let mut step_number = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                next = stream.next() => next,
            };
            let event = match next {
                Some(event) => event.map_err(EngineError::Stream)?,
                None => break,
            };

            match event {
                ModelEvent::ReasoningDelta(text) => {
                    step_number += 1;
                    outcome.thinking_steps += 1;
                    sink.emit(
                        StreamChunk::thinking(text).with_metadata("step_number", json!(step_number)),
                    )?;
                }
                ModelEvent::ContentDelta(text) => {
                    outcome.content_length += text.chars().count();
                    sink.emit(StreamChunk::content(text))?;
                }
                ModelEvent::ToolCallStarted {
                    item_id,
                    call_id,
                    name,
                } => {
                    debug!(tool = %name, call_id = %call_id, "Tool call started");
                    calls.start(&item_id, &call_id, &name);
                }
                ModelEvent::ToolCallArgumentsDelta { item_id, delta } => {
                    calls.append(item_id.as_deref(), &delta);
                }
                ModelEvent::ToolCallDone {
                    item_id,
                    call_id,
                    name,
                    arguments,
                } => {
                    calls.finish(
                        &item_id,
                        call_id.as_deref(),
                        name.as_deref(),
                        arguments.as_deref(),
                    );
                }
                ModelEvent::Completed => break,
            }
        }

        Ok(calls.into_completed())
    }

    /// Execute calls in order. Failures become `Error: ...` outputs.
    async fn execute_calls(
        &self,
        executor: &dyn ToolExecutor,
        calls: Vec<ToolCallRequest>,
        conversation: &mut Vec<ConversationItem>,
        sink: &mut ChunkSink,
        outcome: &mut LoopOutcome,
    ) -> EngineResult<()> {
        let cancel = sink.cancellation().clone();

        for call in calls {
            let arguments = call.parsed_arguments();
            let rendered = serde_json::to_string(&arguments).unwrap_or_else(|_| "{}".to_string());

            outcome.thinking_steps += 1;
            sink.emit(
                StreamChunk::thinking(format!("[Tool call] {}({})", call.name, rendered))
                    .with_metadata("tool_name", json!(call.name))
                    .with_metadata("tool_call_id", json!(call.call_id)),
            )?;

            info!(tool = %call.name, call_id = %call.call_id, "Executing tool call");
            let executed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                executed = executor.execute(&call.name, arguments) => executed,
            };

            let result = match executed {
                Ok(output) => ToolCallResult::success(&call, output),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    ToolCallResult::error(&call, e)
                }
            };
            outcome.tool_calls += 1;

            let raw_arguments = if call.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            conversation.push(ConversationItem::FunctionCall {
                call_id: call.call_id,
                name: call.name,
                arguments: raw_arguments,
            });
            conversation.push(ConversationItem::FunctionCallOutput {
                call_id: result.call_id,
                output: result.output,
            });
        }

        Ok(())
    }
}

// ============================================================================
// Chat Engine
// ============================================================================

/// Runs turns in the background.
#[derive(Clone)]
pub struct ChatEngine {
    backend: Arc<dyn ModelBackend>,
    connector: Arc<dyn Connector>,
    settings: EngineSettings,
}

impl ChatEngine {
    pub fn new(backend: Arc<dyn ModelBackend>, connector: Arc<dyn Connector>) -> Self {
        Self {
            backend,
            connector,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start a turn. Must be called inside a tokio runtime.
    ///
    /// The returned stream ends with exactly one `done` or `error` chunk.
    /// Dropping it cancels the turn; tool server sessions are still closed.
    pub fn stream_turn(&self, request: TurnRequest) -> TurnStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sink = ChunkSink::new(tx, cancel.clone());

        tokio::spawn(drive_turn(
            Arc::clone(&self.backend),
            Arc::clone(&self.connector),
            self.settings.clone(),
            request,
            sink,
        ));

        TurnStream { rx, cancel }
    }
}

async fn drive_turn(
    backend: Arc<dyn ModelBackend>,
    connector: Arc<dyn Connector>,
    settings: EngineSettings,
    request: TurnRequest,
    mut sink: ChunkSink,
) {
    let session_id = request.session_id.clone();
    let mut registry = if request.servers.is_empty() {
        None
    } else {
        Some(ToolRegistry::new(connector, settings.session.clone()))
    };

    let result = AssertUnwindSafe(run_turn(
        backend.as_ref(),
        registry.as_mut(),
        settings.max_tool_rounds,
        request,
        &mut sink,
    ))
    .catch_unwind()
    .await;

    if let Some(registry) = &registry {
        registry.close_all().await;
    }

    let terminal = match result {
        Ok(Ok(outcome)) => {
            info!(
                rounds = outcome.rounds,
                tool_calls = outcome.tool_calls,
                content_length = outcome.content_length,
                "Turn complete"
            );
            outcome.to_done_chunk(session_id.as_deref())
        }
        Ok(Err(e)) => {
            match e {
                EngineError::Cancelled | EngineError::Disconnected => {
                    warn!(error = %e, "Turn stopped early")
                }
                _ => error!(error = %e, "Turn failed"),
            }
            StreamChunk::error(e.to_string(), e.category())
        }
        Err(payload) => {
            let e = EngineError::Panic(panic_message(payload.as_ref()));
            error!(error = %e, "Turn panicked");
            StreamChunk::error(e.to_string(), e.category())
        }
    };

    if let Err(e) = sink.emit(terminal) {
        debug!(error = %e, "Terminal chunk not delivered");
    }
}

async fn run_turn(
    backend: &dyn ModelBackend,
    registry: Option<&mut ToolRegistry>,
    max_rounds: usize,
    request: TurnRequest,
    sink: &mut ChunkSink,
) -> EngineResult<LoopOutcome> {
    let TurnRequest {
        mut conversation,
        servers,
        options,
        ..
    } = request;

    let mut tool_loop = ToolLoop::new(backend, options).with_max_rounds(max_rounds);

    if let Some(registry) = registry {
        let report = registry.initialize_all(&servers).await;
        for (url, reason) in &report.failed {
            warn!(url = %url, reason = %reason, "Tool server unavailable for this turn");
        }

        let registry: &ToolRegistry = registry;
        let tools = registry.function_tools().await;
        info!(
            servers = registry.len(),
            tools = tools.len(),
            "Tool catalog ready"
        );
        if !tools.is_empty() {
            tool_loop = tool_loop.with_tools(registry, tools);
        }
    }

    tool_loop.run(&mut conversation, sink).await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Turn Stream
// ============================================================================

/// Consumer side of a running turn.
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<StreamChunk>,
    cancel: CancellationToken,
}

impl TurnStream {
    /// A stream that yields only `chunk`, for turns that fail before they
    /// start.
    pub(crate) fn terminated(chunk: StreamChunk) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(chunk);
        Self {
            rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the turn at the next event. The stream still ends with an
    /// `error` chunk of type `cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for TurnStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A whole turn, gathered from its chunks.
#[derive(Debug, Clone, Default)]
pub struct TurnTranscript {
    pub content: String,
    pub thinking_steps: Vec<ThinkingStep>,
    /// The `done` or `error` chunk, if the stream produced one
    pub terminal: Option<StreamChunk>,
}

impl TurnTranscript {
    /// Fold one chunk into the transcript.
    pub fn record(&mut self, chunk: &StreamChunk) {
        match chunk.kind {
            ChunkKind::Thinking => {
                let step_number = chunk
                    .meta("step_number")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                self.thinking_steps
                    .push(ThinkingStep::new(step_number, chunk.content.clone()));
            }
            ChunkKind::Content => self.content.push_str(&chunk.content),
            ChunkKind::Done | ChunkKind::Error => {
                if self.terminal.is_none() {
                    self.terminal = Some(chunk.clone());
                }
            }
        }
    }

    /// Whether the turn ended with `done`.
    pub fn is_success(&self) -> bool {
        matches!(&self.terminal, Some(chunk) if chunk.kind == ChunkKind::Done)
    }

    /// The error message, if the turn failed.
    pub fn error(&self) -> Option<&str> {
        match &self.terminal {
            Some(chunk) if chunk.kind == ChunkKind::Error => Some(&chunk.content),
            _ => None,
        }
    }
}

/// Drain a chunk stream into a [`TurnTranscript`].
pub async fn collect_turn<S>(mut stream: S) -> TurnTranscript
where
    S: Stream<Item = StreamChunk> + Unpin,
{
    let mut transcript = TurnTranscript::default();
    while let Some(chunk) = stream.next().await {
        transcript.record(&chunk);
    }
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn sink() -> (ChunkSink, mpsc::UnboundedReceiver<StreamChunk>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (ChunkSink::new(tx, cancel.clone()), rx, cancel)
    }

    #[test]
    fn test_sink_accepts_one_terminal_chunk() {
        let (mut sink, mut rx, _cancel) = sink();
        sink.emit(StreamChunk::content("a")).unwrap();
        sink.emit(StreamChunk::done()).unwrap();
        sink.emit(StreamChunk::error("late", "internal")).unwrap();
        sink.emit(StreamChunk::content("later")).unwrap();

        assert_eq!(rx.try_recv().unwrap(), StreamChunk::content("a"));
        assert_eq!(rx.try_recv().unwrap(), StreamChunk::done());
        assert!(rx.try_recv().is_err());
        assert!(sink.is_terminated());
    }

    #[test]
    fn test_sink_after_cancel() {
        let (mut sink, mut rx, cancel) = sink();
        cancel.cancel();
        assert!(matches!(
            sink.emit(StreamChunk::content("a")),
            Err(EngineError::Cancelled)
        ));
        sink.emit(StreamChunk::error("Turn cancelled", "cancelled")).unwrap();
        assert!(rx.try_recv().unwrap().is_terminal());
    }

    #[test]
    fn test_sink_reports_disconnect() {
        let (mut sink, rx, _cancel) = sink();
        drop(rx);
        assert!(matches!(
            sink.emit(StreamChunk::content("a")),
            Err(EngineError::Disconnected)
        ));
    }

    #[test]
    fn test_done_chunk_metadata() {
        let outcome = LoopOutcome {
            rounds: 2,
            content_length: 5,
            thinking_steps: 3,
            tool_calls: 1,
        };
        let chunk = outcome.to_done_chunk(Some("s-1"));
        assert_eq!(chunk.meta("rounds"), Some(&json!(2)));
        assert_eq!(chunk.meta("content_length"), Some(&json!(5)));
        assert_eq!(chunk.meta("total_thinking_steps"), Some(&json!(3)));
        assert_eq!(chunk.meta("tool_calls"), Some(&json!(1)));
        assert_eq!(chunk.meta("session_id"), Some(&json!("s-1")));
        assert!(outcome.to_done_chunk(None).meta("session_id").is_none());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.engine.max_tool_rounds = 0;
        config.engine.tool_timeout_secs = 5;
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.max_tool_rounds, 1);
        assert_eq!(settings.session.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.session.client_info.name, "mcpflow");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_collect_turn() {
        let chunks = vec![
            StreamChunk::thinking("plan").with_metadata("step_number", json!(1)),
            StreamChunk::thinking("[Tool call] srv__t({})"),
            StreamChunk::content("Hel"),
            StreamChunk::content("lo"),
            StreamChunk::done(),
        ];
        let transcript = collect_turn(stream::iter(chunks)).await;
        assert_eq!(transcript.content, "Hello");
        assert_eq!(
            transcript.thinking_steps,
            vec![
                ThinkingStep::new(1, "plan"),
                ThinkingStep::new(0, "[Tool call] srv__t({})"),
            ]
        );
        assert!(transcript.is_success());
        assert!(transcript.error().is_none());
    }
}
