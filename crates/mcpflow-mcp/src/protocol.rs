//! MCP protocol types.
//!
//! JSON-RPC 2.0 envelopes plus the handful of MCP payloads the client needs:
//! the initialize handshake, tool listing and tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version sent when none is configured.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID, unique within one session.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcRequest<P> {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification (no ID, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcNotification<P> {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    #[serde(default)]
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// MCP Protocol Types
// ============================================================================

/// Client information sent during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcpflow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server information returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Tools capability. Serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {}

/// Client capabilities for initialization. Only tools are declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub tools: ToolsCapability,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolsCapability {},
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Result of the initialize request.
///
/// Every field is optional; servers differ in how much they report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeResult {
    pub protocol_version: Option<String>,
    pub capabilities: Value,
    pub server_info: Option<ServerInfo>,
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListToolsResult {
    pub tools: Vec<McpToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// MCP tool definition as returned by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// Result of the tools/call request.
///
/// Content parts are kept as raw JSON so unknown part types survive into
/// the extracted text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallToolResult {
    pub content: Vec<Value>,
    pub is_error: bool,
}

impl CallToolResult {
    /// Flatten the content parts into one string.
    pub fn text(&self) -> String {
        extract_text(&self.content)
    }
}

/// Join content parts with newlines.
///
/// Text parts contribute their text, resource parts the resource's inline
/// text (or the resource JSON when it has none), anything else its JSON.
pub fn extract_text(parts: &[Value]) -> String {
    parts
        .iter()
        .map(|part| match part.get("type").and_then(Value::as_str) {
            Some("text") => part
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some("resource") => {
                let resource = part.get("resource").cloned().unwrap_or_else(|| Value::Object(Default::default()));
                match resource.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => resource.to_string(),
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request: JsonRpcRequest<InitializeParams> =
            JsonRpcRequest::new(1, "initialize", Some(InitializeParams::default()));

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"capabilities\":{\"tools\":{}}"));
        assert!(json.contains("\"protocolVersion\":\"2025-03-26\""));
    }

    #[test]
    fn test_request_without_params_omits_field() {
        let request: JsonRpcRequest<()> = JsonRpcRequest::new(7, "tools/list", None);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification: JsonRpcNotification<()> =
            JsonRpcNotification::new("notifications/initialized", None);
        let value = serde_json::to_value(&notification).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "notifications/initialized");
    }

    #[test]
    fn test_list_tools_parsing() {
        let json = r#"{
            "tools": [
                {"name": "search", "description": "Search docs", "inputSchema": {"type": "object"}},
                {"name": "ping"}
            ]
        }"#;

        let result: ListToolsResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.tools.len(), 2);
        assert_eq!(result.tools[0].name, "search");
        assert!(result.tools[1].description.is_none());
        assert!(result.tools[1].input_schema.is_none());
    }

    #[test]
    fn test_initialize_result_tolerates_empty_object() {
        let result: InitializeResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.server_info.is_none());
    }

    #[test]
    fn test_extract_text_mixed_parts() {
        let parts = vec![
            json!({"type": "text", "text": "first"}),
            json!({"type": "resource", "resource": {"uri": "file:///a", "text": "inline"}}),
            json!({"type": "image", "data": "AAAA", "mimeType": "image/png"}),
        ];
        let text = extract_text(&parts);
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "first");
        assert_eq!(lines[1], "inline");
        assert!(lines[2].contains("\"image\""));
    }

    #[test]
    fn test_extract_text_resource_without_text() {
        let parts = vec![json!({"type": "resource", "resource": {"uri": "file:///a"}})];
        assert_eq!(extract_text(&parts), r#"{"uri":"file:///a"}"#);
    }

    #[test]
    fn test_call_tool_result_parsing() {
        let json = r#"{"content": [{"type": "text", "text": "boom"}], "isError": true}"#;
        let result: CallToolResult = serde_json::from_str(json).unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "boom");
    }
}
