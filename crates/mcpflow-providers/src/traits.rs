//! Model backend trait definitions.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use mcpflow_core::config::ModelConfig;
use mcpflow_core::{ConversationItem, FunctionTool, ReasoningEffort, Verbosity};

/// One event from a streaming generation, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Reasoning summary text
    ReasoningDelta(String),
    /// Answer text
    ContentDelta(String),
    /// The model started a tool call
    ToolCallStarted {
        item_id: String,
        call_id: String,
        name: String,
    },
    /// A fragment of a tool call's JSON arguments
    ToolCallArgumentsDelta {
        /// Output item the fragment belongs to, when the backend says
        item_id: Option<String>,
        delta: String,
    },
    /// The tool call is complete. Fields present here override what was
    /// accumulated from earlier events.
    ToolCallDone {
        item_id: String,
        call_id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// The generation finished
    Completed,
}

/// Tuning parameters passed through to the backend uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Ask for reasoning summaries
    pub show_thinking: bool,
    pub reasoning_effort: ReasoningEffort,
    pub verbosity: Verbosity,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for GenerationOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            show_thinking: config.show_thinking,
            reasoning_effort: config.reasoning_effort,
            verbosity: config.verbosity,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// One streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub input: Vec<ConversationItem>,
    /// Tools the model may call; empty disables tool calling
    pub tools: Vec<FunctionTool>,
    pub options: GenerationOptions,
}

/// Ordered stream of model events.
pub type ModelEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<ModelEvent>> + Send>>;

/// A streaming text-generation service.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend identifier, used in logs.
    fn id(&self) -> &str;

    /// Start a streaming generation.
    async fn stream(&self, request: GenerationRequest) -> anyhow::Result<ModelEventStream>;
}

/// Supplies bearer credentials for the model backend.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> anyhow::Result<String>;
}

/// A fixed token, typically an API key.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_model_config() {
        let mut config = ModelConfig::default();
        config.show_thinking = false;
        config.reasoning_effort = ReasoningEffort::High;
        let options = GenerationOptions::from(&config);
        assert!(!options.show_thinking);
        assert_eq!(options.reasoning_effort, ReasoningEffort::High);
        assert_eq!(options.max_output_tokens, 16_000);
    }

    #[tokio::test]
    async fn test_static_token_hides_secret() {
        let token = StaticToken::new("sk-secret");
        assert_eq!(token.bearer_token().await.unwrap(), "sk-secret");
        assert!(!format!("{:?}", token).contains("secret"));
    }
}
