//! Tool call types shared by the engine and the model backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition in the shape the model backend expects.
///
/// Carries no routing information; the registry keeps that to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionTool {
    /// Create a new function tool with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id the output must be paired with
    pub call_id: String,
    /// Qualified tool name
    pub name: String,
    /// Raw JSON arguments as streamed by the model
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments, falling back to an empty object when they are
    /// empty or not valid JSON.
    pub fn parsed_arguments(&self) -> Value {
        if self.arguments.trim().is_empty() {
            return Value::Object(Default::default());
        }
        serde_json::from_str(&self.arguments).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolCallResult {
    /// Create a successful result.
    pub fn success(request: &ToolCallRequest, output: impl Into<String>) -> Self {
        Self {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Create a failed result. The output is prefixed with `Error: ` so the
    /// model can see what went wrong.
    pub fn error(request: &ToolCallRequest, message: impl std::fmt::Display) -> Self {
        Self {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            output: format!("Error: {}", message),
            is_error: true,
        }
    }
}
