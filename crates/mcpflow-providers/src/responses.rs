//! Responses-API backend.
//!
//! Streams `response.*` events over SSE and maps the ones the engine cares
//! about onto [`ModelEvent`]. Unknown event types are skipped.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use mcpflow_core::config::ModelConfig;
use mcpflow_core::{FunctionTool, ReasoningEffort, Verbosity};

use crate::error::BackendError;
use crate::sse::SseParser;
use crate::traits::{
    CredentialProvider, GenerationRequest, ModelBackend, ModelEvent, ModelEventStream, StaticToken,
};

/// Backend speaking the Responses streaming API.
pub struct ResponsesBackend {
    client: Client,
    url: String,
    deployment: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ResponsesBackend {
    /// Create a backend for `url` using `deployment` as the model name.
    pub fn new(
        url: impl Into<String>,
        deployment: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            deployment: deployment.into(),
            credentials,
        })
    }

    /// Build from the `[model]` config section.
    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        let key = config.resolve_api_key().ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "set model.api_key or the {} environment variable",
                config.api_key_env.as_deref().unwrap_or("model.api_key_env")
            ))
        })?;
        Self::new(
            &config.responses_url,
            &config.deployment,
            Arc::new(StaticToken::new(key)),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> ResponsesRequest<'a> {
        let options = &request.options;
        ResponsesRequest {
            model: &self.deployment,
            input: request.input.iter().map(|item| item.to_input()).collect(),
            stream: true,
            max_output_tokens: options.max_output_tokens,
            reasoning: ReasoningParams {
                effort: options.reasoning_effort,
                summary: if options.show_thinking { "auto" } else { "none" },
            },
            text: TextParams {
                verbosity: options.verbosity,
            },
            tools: &request.tools,
        }
    }
}

#[async_trait]
impl ModelBackend for ResponsesBackend {
    fn id(&self) -> &str {
        "responses"
    }

    async fn stream(&self, request: GenerationRequest) -> anyhow::Result<ModelEventStream> {
        let body = self.build_body(&request);
        let token = self.credentials.bearer_token().await?;

        debug!(
            model = %self.deployment,
            items = body.input.len(),
            tools = body.tools.len(),
            "Sending streaming request to Responses API"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Responses API error: {} - {}", status, error_text);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_text,
            }
            .into());
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<Value>,
    stream: bool,
    max_output_tokens: u32,
    reasoning: ReasoningParams,
    text: TextParams,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [FunctionTool],
}

#[derive(Debug, Serialize)]
struct ReasoningParams {
    effort: ReasoningEffort,
    summary: &'static str,
}

#[derive(Debug, Serialize)]
struct TextParams {
    verbosity: Verbosity,
}

/// Streamed event as sent by the API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: WireItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: WireItem },
    #[serde(rename = "response.completed")]
    Completed {},
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: Value,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl WireItem {
    fn is_function_call(&self) -> bool {
        self.kind == "function_call"
    }

    /// Key used to pair argument deltas with this item.
    fn item_key(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.call_id.clone())
            .unwrap_or_default()
    }
}

/// Decode one SSE data payload.
///
/// Unparseable payloads and uninteresting events yield `Ok(None)`; failure
/// events yield an error.
pub fn decode_event(data: &str) -> Result<Option<ModelEvent>, BackendError> {
    let event: WireEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse Responses event: {}", e);
            return Ok(None);
        }
    };

    Ok(match event {
        WireEvent::ReasoningSummaryDelta { delta } => Some(ModelEvent::ReasoningDelta(delta)),
        WireEvent::OutputTextDelta { delta } => Some(ModelEvent::ContentDelta(delta)),
        WireEvent::OutputItemAdded { item } if item.is_function_call() => {
            let item_id = item.item_key();
            Some(ModelEvent::ToolCallStarted {
                call_id: item.call_id.unwrap_or_else(|| item_id.clone()),
                name: item.name.unwrap_or_default(),
                item_id,
            })
        }
        WireEvent::FunctionCallArgumentsDelta { item_id, delta } => {
            Some(ModelEvent::ToolCallArgumentsDelta { item_id, delta })
        }
        WireEvent::OutputItemDone { item } if item.is_function_call() => {
            Some(ModelEvent::ToolCallDone {
                item_id: item.item_key(),
                call_id: item.call_id,
                name: item.name,
                arguments: item.arguments,
            })
        }
        WireEvent::Completed {} => Some(ModelEvent::Completed),
        WireEvent::Failed { response } => {
            let message = response
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(BackendError::ResponseFailed(message));
        }
        WireEvent::Error { message } => {
            return Err(BackendError::ResponseFailed(
                message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        WireEvent::OutputItemAdded { .. } | WireEvent::OutputItemDone { .. } | WireEvent::Other => {
            None
        }
    })
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    parser: SseParser,
    pending: VecDeque<anyhow::Result<ModelEvent>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn push_events(&mut self, events: Vec<crate::sse::SseEvent>) {
        for event in events {
            if event.is_done() {
                continue;
            }
            match decode_event(&event.data) {
                Ok(Some(model_event)) => self.pending.push_back(Ok(model_event)),
                Ok(None) => {}
                Err(e) => {
                    self.pending.push_back(Err(e.into()));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Turn an SSE byte stream into model events.
///
/// Every event in a network chunk is delivered, in order; a failure event
/// ends the stream after being yielded.
pub fn decode_event_stream<S, B, E>(bytes: S) -> ModelEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.feed(chunk.as_ref());
                    state.push_events(events);
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(BackendError::Stream(e.to_string()).into()));
                    state.finished = true;
                }
                None => {
                    let events = state.parser.finish();
                    state.push_events(events);
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::GenerationOptions;
    use mcpflow_core::ConversationItem;
    use serde_json::json;

    fn backend() -> ResponsesBackend {
        ResponsesBackend::new(
            "https://example.invalid/v1/responses",
            "gpt-test",
            Arc::new(StaticToken::new("k")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let backend = backend();
        let request = GenerationRequest {
            input: vec![ConversationItem::system("rules"), ConversationItem::user("hi")],
            tools: vec![FunctionTool::new("srv__echo", "Echo")],
            options: GenerationOptions {
                show_thinking: false,
                reasoning_effort: ReasoningEffort::Low,
                verbosity: Verbosity::High,
                max_output_tokens: 1000,
            },
        };

        let body = serde_json::to_value(backend.build_body(&request)).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_output_tokens"], 1000);
        assert_eq!(body["reasoning"], json!({"effort": "low", "summary": "none"}));
        assert_eq!(body["text"], json!({"verbosity": "high"}));
        assert_eq!(body["input"][0]["role"], "developer");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["name"], "srv__echo");
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let backend = backend();
        let request = GenerationRequest {
            input: vec![ConversationItem::user("hi")],
            tools: vec![],
            options: GenerationOptions::default(),
        };
        let body = serde_json::to_value(backend.build_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["reasoning"]["summary"], "auto");
    }

    #[test]
    fn test_decode_text_events() {
        assert_eq!(
            decode_event(r#"{"type":"response.output_text.delta","delta":"Hel"}"#).unwrap(),
            Some(ModelEvent::ContentDelta("Hel".to_string()))
        );
        assert_eq!(
            decode_event(r#"{"type":"response.reasoning_summary_text.delta","delta":"think"}"#)
                .unwrap(),
            Some(ModelEvent::ReasoningDelta("think".to_string()))
        );
        assert_eq!(
            decode_event(r#"{"type":"response.completed","response":{}}"#).unwrap(),
            Some(ModelEvent::Completed)
        );
    }

    #[test]
    fn test_decode_function_call_events() {
        let added = r#"{"type":"response.output_item.added","item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"srv__echo","arguments":""}}"#;
        assert_eq!(
            decode_event(added).unwrap(),
            Some(ModelEvent::ToolCallStarted {
                item_id: "fc_1".to_string(),
                call_id: "call_1".to_string(),
                name: "srv__echo".to_string(),
            })
        );

        let delta = r#"{"type":"response.function_call_arguments.delta","item_id":"fc_1","delta":"{\"x\""}"#;
        assert_eq!(
            decode_event(delta).unwrap(),
            Some(ModelEvent::ToolCallArgumentsDelta {
                item_id: Some("fc_1".to_string()),
                delta: "{\"x\"".to_string(),
            })
        );

        let done = r#"{"type":"response.output_item.done","item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"srv__echo","arguments":"{\"x\":1}"}}"#;
        assert_eq!(
            decode_event(done).unwrap(),
            Some(ModelEvent::ToolCallDone {
                item_id: "fc_1".to_string(),
                call_id: Some("call_1".to_string()),
                name: Some("srv__echo".to_string()),
                arguments: Some("{\"x\":1}".to_string()),
            })
        );
    }

    #[test]
    fn test_decode_ignores_other_items_and_events() {
        let message_item = r#"{"type":"response.output_item.added","item":{"type":"message","id":"msg_1"}}"#;
        assert_eq!(decode_event(message_item).unwrap(), None);
        assert_eq!(decode_event(r#"{"type":"response.created","response":{}}"#).unwrap(), None);
        assert_eq!(decode_event("not json").unwrap(), None);
    }

    #[test]
    fn test_decode_failure_events() {
        let failed = r#"{"type":"response.failed","response":{"error":{"message":"quota exceeded"}}}"#;
        let err = decode_event(failed).unwrap_err();
        assert_eq!(err.to_string(), "model response failed: quota exceeded");

        let error = r#"{"type":"error","message":"bad request"}"#;
        assert!(decode_event(error).is_err());
    }

    #[tokio::test]
    async fn test_stream_delivers_every_event_in_chunk() {
        let body = concat!(
            "event: response.output_text.delta\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"a\"}\n\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"b\"}\n\n",
            "data: {\"type\":\"response.output_text.de"
        );
        let tail = "lta\",\"delta\":\"c\"}\n\ndata: {\"type\":\"response.completed\"}\n\n";
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(body.as_bytes().to_vec()), Ok(tail.as_bytes().to_vec())];

        let events: Vec<ModelEvent> = decode_event_stream(stream::iter(chunks))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                ModelEvent::ContentDelta("a".to_string()),
                ModelEvent::ContentDelta("b".to_string()),
                ModelEvent::ContentDelta("c".to_string()),
                ModelEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_ends_after_failure() {
        let body = concat!(
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"a\"}\n\n",
            "data: {\"type\":\"response.failed\",\"response\":{\"error\":{\"message\":\"boom\"}}}\n\n",
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"never\"}\n\n",
        );
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(body.as_bytes().to_vec())];

        let results: Vec<anyhow::Result<ModelEvent>> =
            decode_event_stream(stream::iter(chunks)).collect().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.downcast_ref::<BackendError>().is_some());
    }

    #[tokio::test]
    async fn test_transport_error_becomes_stream_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let results: Vec<anyhow::Result<ModelEvent>> =
            decode_event_stream(stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().to_string().contains("reset"));
    }
}
