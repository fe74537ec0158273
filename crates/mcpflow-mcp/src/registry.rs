//! Multi-server tool registry.
//!
//! Owns the sessions for one request, merges their tools into one catalog
//! and routes calls back to the session that registered each name.
//! Servers that fail are logged and left out; they never fail the whole
//! registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use mcpflow_core::{FunctionTool, ServerConfig};

use crate::error::McpError;
use crate::naming::IdentityAllocator;
use crate::session::{ServerSession, SessionSettings, ToolDescriptor};
use crate::transport::Connector;

/// Where a qualified name is dispatched to.
struct Route {
    session: Arc<ServerSession>,
    raw_name: String,
}

/// Outcome of [`ToolRegistry::initialize_all`].
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    /// Identities of sessions that completed the handshake
    pub ready: Vec<String>,
    /// `(url, reason)` for every server that was left out
    pub failed: Vec<(String, String)>,
}

/// Merged tool catalog over several servers.
pub struct ToolRegistry {
    connector: Arc<dyn Connector>,
    settings: SessionSettings,
    identities: IdentityAllocator,
    sessions: Vec<Arc<ServerSession>>,
    routes: RwLock<HashMap<String, Route>>,
    closed: AtomicBool,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new(connector: Arc<dyn Connector>, settings: SessionSettings) -> Self {
        Self {
            connector,
            settings,
            identities: IdentityAllocator::new(),
            sessions: Vec::new(),
            routes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Identities of the live sessions, in configuration order.
    pub fn server_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|s| s.identity().to_string())
            .collect()
    }

    /// Connect to and initialize every server concurrently.
    ///
    /// Servers whose transport cannot be created or whose handshake fails
    /// are closed and excluded. Never fails.
    pub async fn initialize_all(&mut self, configs: &[ServerConfig]) -> InitReport {
        let mut report = InitReport::default();
        let mut pending = Vec::with_capacity(configs.len());

        for config in configs {
            match self.connector.connect(config) {
                Ok(transport) => {
                    let identity = self.identities.allocate(&config.url);
                    pending.push(Arc::new(ServerSession::new(
                        identity,
                        config.clone(),
                        transport,
                        self.settings.clone(),
                    )));
                }
                Err(e) => {
                    error!(url = %config.url, error = %e, "Failed to create MCP transport");
                    report.failed.push((config.url.clone(), e.to_string()));
                }
            }
        }

        let results = join_all(pending.iter().map(|s| s.initialize())).await;

        for (session, result) in pending.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    report.ready.push(session.identity().to_string());
                    self.sessions.push(session);
                }
                Err(e) => {
                    error!(url = %session.url(), error = %e, "Failed to initialize MCP server");
                    if let Err(close_err) = session.close().await {
                        debug!(url = %session.url(), error = %close_err, "Close after failed handshake");
                    }
                    report.failed.push((session.url().to_string(), e.to_string()));
                }
            }
        }

        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "MCP servers initialized"
        );

        report
    }

    /// List tools from every session concurrently and rebuild the routing
    /// table. A server whose listing fails contributes no tools.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        let results = join_all(self.sessions.iter().map(|s| s.list_tools())).await;

        let mut routes = HashMap::new();
        let mut catalog = Vec::new();

        for (session, result) in self.sessions.iter().zip(results) {
            match result {
                Ok(tools) => {
                    for tool in tools {
                        if routes.contains_key(&tool.qualified_name) {
                            warn!(
                                tool = %tool.qualified_name,
                                server = %session.identity(),
                                "Duplicate tool name, keeping the first"
                            );
                            continue;
                        }
                        routes.insert(
                            tool.qualified_name.clone(),
                            Route {
                                session: Arc::clone(session),
                                raw_name: tool.raw_name.clone(),
                            },
                        );
                        catalog.push(tool);
                    }
                }
                Err(e) => {
                    error!(url = %session.url(), error = %e, "Failed to list tools");
                }
            }
        }

        *self.routes.write().await = routes;
        catalog
    }

    /// Catalog in the shape handed to the model backend.
    pub async fn function_tools(&self) -> Vec<FunctionTool> {
        self.catalog()
            .await
            .iter()
            .map(ToolDescriptor::to_function_tool)
            .collect()
    }

    /// Forward a call to the session that registered `qualified_name`.
    pub async fn dispatch(&self, qualified_name: &str, arguments: Value) -> Result<String, McpError> {
        let (session, raw_name) = {
            let routes = self.routes.read().await;
            let route = routes
                .get(qualified_name)
                .ok_or_else(|| McpError::UnknownTool(qualified_name.to_string()))?;
            (Arc::clone(&route.session), route.raw_name.clone())
        };

        info!(tool = %raw_name, server = %session.identity(), "Executing MCP tool");
        session.call_tool(&raw_name, arguments).await
    }

    /// Close every session concurrently. Best-effort and idempotent.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let results = join_all(self.sessions.iter().map(|s| s.close())).await;
        for (session, result) in self.sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!(server = %session.identity(), error = %e, "Failed to close session");
            }
        }
        self.routes.write().await.clear();

        debug!(sessions = self.sessions.len(), "Registry closed");
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ToolRegistry {
    fn drop(&mut self) {
        if !self.is_closed() && !self.sessions.is_empty() {
            warn!(
                sessions = self.sessions.len(),
                "Tool registry dropped without close_all; transports released on drop"
            );
        }
    }
}
