//! Tool execution seam between the loop and the tool registry.
//!
//! ```text
//! ToolLoop (rounds, chunks)
//!   └─> ToolExecutor
//!       └─> ToolRegistry (qualified name -> session)
//!           └─> ServerSession::call_tool
//! ```
//!
//! The loop only sees qualified names and JSON arguments. Tests plug in
//! their own executor.

use async_trait::async_trait;
use mcpflow_mcp::ToolRegistry;
use serde_json::Value;

/// Executes one tool call by qualified name.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool and return its text output.
    async fn execute(&self, name: &str, arguments: Value) -> anyhow::Result<String>;
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, arguments: Value) -> anyhow::Result<String> {
        Ok(self.dispatch(name, arguments).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use mcpflow_mcp::{HttpConnector, SessionSettings};
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_reports_unknown_tool() {
        let registry = ToolRegistry::new(
            Arc::new(HttpConnector::default()),
            SessionSettings::default(),
        );
        let err = registry
            .execute("nobody__nothing", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nobody__nothing"));
        registry.close_all().await;
    }
}
