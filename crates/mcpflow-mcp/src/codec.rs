//! Envelope encoding and response-body decoding.
//!
//! Servers on the streamable-http transport may answer a single request
//! either with a plain JSON body or with an event stream that wraps the
//! response in `data:` lines. Both shapes decode to one JSON value here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest};

/// Per-session codec. Owns the request-id counter, so ids are unique and
/// increasing within one session and independent across sessions.
#[derive(Debug)]
pub struct Codec {
    next_id: AtomicU64,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Create a codec whose first request id is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Encode a request, assigning the next id.
    pub fn encode_request<P: Serialize>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<(u64, String), McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        Ok((id, serde_json::to_string(&request)?))
    }

    /// Encode a notification. Notifications carry no id.
    pub fn encode_notification<P: Serialize>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<String, McpError> {
        Ok(serde_json::to_string(&JsonRpcNotification::new(method, params))?)
    }
}

/// Whether a Content-Type header names an event stream.
pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Pull the JSON value out of an event-stream body.
///
/// The last `data:` line that parses wins. Lines that do not parse are
/// skipped; a body with no parseable line yields `{}`.
pub fn parse_event_stream(body: &str) -> Value {
    body.lines()
        .filter_map(sse_data_payload)
        .filter(|payload| !payload.is_empty())
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .last()
        .unwrap_or_else(|| Value::Object(Default::default()))
}

/// Decode a response body according to its content type.
pub fn decode_body(content_type: &str, body: &[u8]) -> Result<Value, McpError> {
    let text = String::from_utf8_lossy(body);
    if is_event_stream_content_type(content_type) {
        return Ok(parse_event_stream(&text));
    }
    serde_json::from_str(&text)
        .map_err(|e| McpError::protocol(format!("Failed to parse response: {}", e)))
}

/// Unwrap a decoded JSON-RPC response into its typed result.
///
/// An `error` member becomes [`McpError::Server`]. A response without a
/// `result` (including a non-object response) is treated as `{}`.
pub fn into_result<R: DeserializeOwned>(response: Value) -> Result<R, McpError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let error: JsonRpcError = serde_json::from_value(error.clone()).unwrap_or(JsonRpcError {
            code: 0,
            message: error.to_string(),
            data: None,
        });
        return Err(McpError::server(error.code, error.message));
    }

    let result = response
        .get("result")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    serde_json::from_value(result)
        .map_err(|e| McpError::protocol(format!("Unexpected result shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ListToolsResult;
    use serde_json::json;

    #[test]
    fn test_ids_increase_per_codec() {
        let a = Codec::new();
        let b = Codec::new();
        let (id1, _) = a.encode_request::<()>("tools/list", None).unwrap();
        let (id2, _) = a.encode_request::<()>("tools/list", None).unwrap();
        let (other, _) = b.encode_request::<()>("tools/list", None).unwrap();
        assert_eq!((id1, id2, other), (1, 2, 1));
    }

    #[test]
    fn test_encode_request_wraps_params() {
        let codec = Codec::new();
        let (_, body) = codec
            .encode_request("tools/call", Some(json!({"name": "echo"})))
            .unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["params"]["name"], "echo");
    }

    #[test]
    fn test_content_type_detection() {
        assert!(is_event_stream_content_type("text/event-stream"));
        assert!(is_event_stream_content_type("Text/Event-Stream; charset=utf-8"));
        assert!(!is_event_stream_content_type("application/json"));
        assert!(!is_event_stream_content_type(""));
    }

    #[test]
    fn test_event_stream_last_valid_wins() {
        let body = "event: message\ndata: {\"a\":1}\n\ndata: not json\n\ndata: {\"b\":2}\n\ndata: {broken\n";
        assert_eq!(parse_event_stream(body), json!({"b": 2}));
    }

    #[test]
    fn test_event_stream_without_valid_data_is_empty_object() {
        assert_eq!(parse_event_stream(""), json!({}));
        assert_eq!(parse_event_stream("data: nope\n: comment\ndata:\n"), json!({}));
    }

    #[test]
    fn test_event_stream_handles_crlf() {
        let body = "data: {\"x\":true}\r\n\r\n";
        assert_eq!(parse_event_stream(body), json!({"x": true}));
    }

    #[test]
    fn test_decode_body_json() {
        let value = decode_body("application/json", br#"{"result":{}}"#).unwrap();
        assert_eq!(value, json!({"result": {}}));
        assert!(matches!(
            decode_body("application/json", b"<html>"),
            Err(McpError::Protocol(_))
        ));
    }

    #[test]
    fn test_into_result_error_object() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "no such method"}});
        let err = into_result::<Value>(response).unwrap_err();
        assert!(matches!(err, McpError::Server { code: -32601, .. }));
    }

    #[test]
    fn test_into_result_missing_result_is_empty() {
        let tools: ListToolsResult = into_result(json!({})).unwrap();
        assert!(tools.tools.is_empty());
        let tools: ListToolsResult = into_result(json!("weird")).unwrap();
        assert!(tools.tools.is_empty());
    }
}
