//! MCP transport implementations.
//!
//! Every request is an HTTP POST carrying one JSON-RPC message. The reply
//! body is handed back undecoded together with its content type; decoding
//! lives in [`crate::codec`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use mcpflow_core::{ServerConfig, TransportKind};

use crate::error::TransportError;
use crate::protocol::MCP_PROTOCOL_VERSION;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Raw reply to a POST.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// Value of the Content-Type header, empty when absent
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: "application/json".to_string(),
            body: body.into(),
        }
    }

    pub fn event_stream(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: "text/event-stream".to_string(),
            body: body.into(),
        }
    }
}

/// Trait for MCP transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message and return the reply.
    async fn post(&mut self, message: &str) -> Result<RawResponse, TransportError>;

    /// Close the transport connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Creates transports for server configs.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// HTTP transport for streamable-http and legacy SSE servers.
pub struct HttpTransport {
    /// Dropped on close, which releases the connection pool
    client: Option<reqwest::Client>,
    url: String,
    headers: HeaderMap,
    /// Session id issued by the server, echoed on every later request
    session_id: Option<String>,
}

impl HttpTransport {
    /// Create a transport for one server.
    pub fn new(
        config: &ServerConfig,
        protocol_version: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(
            PROTOCOL_VERSION_HEADER,
            HeaderValue::from_str(protocol_version)
                .map_err(|e| TransportError::Request(format!("invalid protocol version: {}", e)))?,
        );
        if let Some(ref key) = config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| TransportError::Request(format!("invalid api key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        if config.transport == TransportKind::Sse {
            debug!(url = %config.url, "Using POST requests for legacy SSE server");
        }

        Ok(Self {
            client: Some(client),
            url: config.url.clone(),
            headers,
            session_id: None,
        })
    }

    /// Session id issued by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(ref id) = self.session_id {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert(SESSION_ID_HEADER, value);
            }
        }
        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&mut self, message: &str) -> Result<RawResponse, TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;

        debug!(url = %self.url, bytes = message.len(), "POST");

        let response = client
            .post(&self.url)
            .headers(self.request_headers())
            .body(message.to_string())
            .send()
            .await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                debug!(url = %self.url, session_id = id, "Server issued session id");
                self.session_id = Some(id.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { content_type, body })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => return Ok(()),
        };

        // Servers that issued a session id expect it to be released.
        if self.session_id.is_some() {
            let result = client
                .delete(&self.url)
                .headers(self.request_headers())
                .send()
                .await;
            if let Err(e) = result {
                debug!(url = %self.url, error = %e, "Session release failed");
            }
        }

        debug!(url = %self.url, "HTTP transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

/// Connector producing [`HttpTransport`]s.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    protocol_version: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(protocol_version: impl Into<String>, timeout: Duration) -> Self {
        Self {
            protocol_version: protocol_version.into(),
            timeout,
        }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(MCP_PROTOCOL_VERSION, Duration::from_secs(30))
    }
}

impl Connector for HttpConnector {
    fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(HttpTransport::new(
            config,
            &self.protocol_version,
            self.timeout,
        )?))
    }
}
