//! A session with one tool server.
//!
//! State machine: `Uninitialized -> Initialized -> Closed`. A closed
//! session is never reused; every operation on it fails with
//! [`McpError::SessionClosed`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use mcpflow_core::{FunctionTool, ServerConfig};

use crate::codec::{decode_body, into_result, Codec};
use crate::error::McpError;
use crate::naming::qualified_name;
use crate::protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, ListToolsResult, ServerInfo, MCP_PROTOCOL_VERSION,
};
use crate::transport::Transport;

/// Lifecycle state of a [`ServerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initialized => write!(f, "initialized"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Settings shared by all sessions of one registry.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    /// Upper bound for each request, including the handshake
    pub request_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A tool as exposed in the merged catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Name the model sees and calls
    pub qualified_name: String,
    /// Name the owning server knows the tool by
    pub raw_name: String,
    pub description: String,
    pub input_schema: Value,
    /// Identity of the owning session
    pub server: String,
}

impl ToolDescriptor {
    /// Model-facing projection without routing information.
    pub fn to_function_tool(&self) -> FunctionTool {
        FunctionTool::new(&self.qualified_name, &self.description)
            .with_parameters(self.input_schema.clone())
    }
}

/// One connection to one tool server.
pub struct ServerSession {
    identity: String,
    config: ServerConfig,
    settings: SessionSettings,
    codec: Codec,
    transport: Mutex<Box<dyn Transport>>,
    state: RwLock<SessionState>,
    /// Serializes handshakes so concurrent callers initialize once.
    init_lock: Mutex<()>,
    server_info: RwLock<Option<ServerInfo>>,
}

impl ServerSession {
    /// Create an uninitialized session over an existing transport.
    pub fn new(
        identity: impl Into<String>,
        config: ServerConfig,
        transport: Box<dyn Transport>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            identity: identity.into(),
            config,
            settings,
            codec: Codec::new(),
            transport: Mutex::new(transport),
            state: RwLock::new(SessionState::Uninitialized),
            init_lock: Mutex::new(()),
            server_info: RwLock::new(None),
        }
    }

    /// Identity used as the qualified-name prefix.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Server info reported during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    fn timeout_secs(&self) -> u64 {
        self.settings.request_timeout.as_secs()
    }

    async fn ensure_open(&self) -> Result<(), McpError> {
        if *self.state.read().await == SessionState::Closed {
            return Err(McpError::SessionClosed);
        }
        Ok(())
    }

    /// Send a request and wait for the response.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.ensure_open().await?;

        let (id, body) = self.codec.encode_request(method, params)?;
        debug!(server = %self.identity, id, method, "Sending request");

        let raw = {
            let mut transport = self.transport.lock().await;
            tokio::time::timeout(self.settings.request_timeout, transport.post(&body))
                .await
                .map_err(|_| McpError::Timeout(self.timeout_secs()))??
        };

        let response = decode_body(&raw.content_type, &raw.body)?;
        into_result(response)
    }

    /// Fire a notification. Delivery failures are logged and dropped.
    async fn notify_best_effort(&self, method: &str) {
        let body = match self.codec.encode_notification::<()>(method, None) {
            Ok(body) => body,
            Err(e) => {
                debug!(server = %self.identity, method, error = %e, "Could not encode notification");
                return;
            }
        };

        let mut transport = self.transport.lock().await;
        match tokio::time::timeout(self.settings.request_timeout, transport.post(&body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!(server = %self.identity, method, error = %e, "Notification not delivered")
            }
            Err(_) => debug!(server = %self.identity, method, "Notification timed out"),
        }
    }

    /// Perform the handshake. A no-op when already initialized.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let _guard = self.init_lock.lock().await;
        match *self.state.read().await {
            SessionState::Initialized => return Ok(()),
            SessionState::Closed => return Err(McpError::SessionClosed),
            SessionState::Uninitialized => {}
        }

        debug!(server = %self.identity, url = %self.config.url, "Initializing MCP session");

        let params = InitializeParams {
            protocol_version: self.settings.protocol_version.clone(),
            capabilities: ClientCapabilities::default(),
            client_info: self.settings.client_info.clone(),
        };
        let result: InitializeResult = self
            .request("initialize", Some(params))
            .await
            .map_err(|e| match e {
                McpError::SessionClosed => e,
                other => McpError::handshake(&self.config.url, other),
            })?;

        self.notify_best_effort("notifications/initialized").await;

        let server_name = result
            .server_info
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        *self.server_info.write().await = result.server_info;

        {
            let mut state = self.state.write().await;
            if *state == SessionState::Closed {
                return Err(McpError::SessionClosed);
            }
            *state = SessionState::Initialized;
        }

        info!(
            server = %self.identity,
            server_name = %server_name,
            protocol_version = %result.protocol_version.unwrap_or_default(),
            "MCP session initialized"
        );

        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), McpError> {
        match self.state().await {
            SessionState::Initialized => Ok(()),
            SessionState::Closed => Err(McpError::SessionClosed),
            SessionState::Uninitialized => self.initialize().await,
        }
    }

    /// List the server's tools as catalog entries.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_initialized().await?;

        debug!(server = %self.identity, "Listing tools");

        let result: ListToolsResult = self
            .request::<(), _>("tools/list", None)
            .await
            .map_err(|e| match e {
                McpError::SessionClosed => e,
                other => McpError::listing(&self.config.url, other),
            })?;

        let tools: Vec<ToolDescriptor> = result
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                qualified_name: qualified_name(&self.identity, &tool.name),
                raw_name: tool.name,
                description: tool.description.unwrap_or_default(),
                input_schema: tool
                    .input_schema
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                server: self.identity.clone(),
            })
            .collect();

        info!(
            server = %self.identity,
            tool_count = tools.len(),
            "Discovered tools"
        );

        Ok(tools)
    }

    /// Call a tool by its raw name and return its text output.
    pub async fn call_tool(&self, raw_name: &str, arguments: Value) -> Result<String, McpError> {
        self.ensure_initialized().await?;

        debug!(server = %self.identity, tool = raw_name, "Calling tool");

        let params = CallToolParams {
            name: raw_name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;
        let text = result.text();

        if result.is_error {
            warn!(server = %self.identity, tool = raw_name, "Tool returned error");
            return Err(McpError::ToolExecution {
                tool: raw_name.to_string(),
                detail: text,
            });
        }

        Ok(text)
    }

    /// Release the transport. Idempotent.
    pub async fn close(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }

        debug!(server = %self.identity, "Closing MCP session");

        let mut transport = self.transport.lock().await;
        transport.close().await?;

        info!(server = %self.identity, "MCP session closed");
        Ok(())
    }
}
