//! Conversation items and transcript messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions)
    System,
    /// Developer message, the wire form of system instructions
    Developer,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    /// Role as sent to the model backend. System instructions travel as
    /// developer messages.
    pub fn wire_role(self) -> Role {
        match self {
            Role::System => Role::Developer,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation sent to the model backend.
///
/// Tool calls and their outputs are fed back as separate items that share a
/// `call_id`, so the model can pair each output with the call that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationItem {
    /// A plain role/content message
    Message { role: Role, content: String },
    /// A tool call the model requested
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The output of a tool call
    FunctionCallOutput { call_id: String, output: String },
}

impl ConversationItem {
    pub fn system(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Render this item in the model backend's input format.
    pub fn to_input(&self) -> Value {
        match self {
            ConversationItem::Message { role, content } => json!({
                "role": role.wire_role().as_str(),
                "content": content,
            }),
            ConversationItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": name,
                "arguments": arguments,
            }),
            ConversationItem::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
        }
    }
}

/// One reasoning step kept with an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingStep {
    /// Position within its round; 0 for tool activity
    pub step_number: usize,
    pub reasoning: String,
}

impl ThinkingStep {
    pub fn new(step_number: usize, reasoning: impl Into<String>) -> Self {
        Self {
            step_number,
            reasoning: reasoning.into(),
        }
    }
}

/// A message stored in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,
    /// Message role
    pub role: Role,
    /// Message content
    pub content: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Reasoning steps shown while the answer was produced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_steps: Vec<ThinkingStep>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            thinking_steps: vec![],
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach reasoning steps.
    pub fn with_thinking_steps(mut self, steps: Vec<ThinkingStep>) -> Self {
        self.thinking_steps = steps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_role_is_sent_as_developer() {
        let item = ConversationItem::system("be terse");
        assert_eq!(
            item.to_input(),
            json!({"role": "developer", "content": "be terse"})
        );
    }

    #[test]
    fn test_user_and_assistant_keep_their_role() {
        assert_eq!(ConversationItem::user("hi").to_input()["role"], "user");
        assert_eq!(ConversationItem::assistant("yo").to_input()["role"], "assistant");
    }

    #[test]
    fn test_function_call_items() {
        let call = ConversationItem::FunctionCall {
            call_id: "c1".to_string(),
            name: "srv__echo".to_string(),
            arguments: r#"{"x":1}"#.to_string(),
        };
        let input = call.to_input();
        assert_eq!(input["type"], "function_call");
        assert_eq!(input["call_id"], "c1");
        assert_eq!(input["arguments"], r#"{"x":1}"#);

        let output = ConversationItem::FunctionCallOutput {
            call_id: "c1".to_string(),
            output: "1".to_string(),
        };
        assert_eq!(
            output.to_input(),
            json!({"type": "function_call_output", "call_id": "c1", "output": "1"})
        );
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::assistant("done").with_thinking_steps(vec![ThinkingStep::new(1, "step")]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.thinking_steps.len(), 1);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_thinking_steps_serialize_with_step_number() {
        let msg = Message::assistant("done").with_thinking_steps(vec![
            ThinkingStep::new(1, "look it up"),
            ThinkingStep::new(0, "[Tool call] srv__search({})"),
        ]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value["thinking_steps"],
            json!([
                {"step_number": 1, "reasoning": "look it up"},
                {"step_number": 0, "reasoning": "[Tool call] srv__search({})"},
            ])
        );

        let plain = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(plain.get("thinking_steps").is_none());
    }
}
