//! Configuration system for mcpflow.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// Main configuration struct for mcpflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tool-call loop settings
    pub engine: EngineConfig,
    /// Tool protocol client settings
    pub mcp: McpConfig,
    /// Model backend settings
    pub model: ModelConfig,
    /// Tool servers used for every turn
    pub servers: Vec<ServerConfig>,
    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of model rounds per turn
    pub max_tool_rounds: usize,
    /// Timeout for each tool protocol request, in seconds
    pub tool_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            tool_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Protocol version sent in the handshake and request headers
    pub protocol_version: String,
    /// Client name announced during the handshake
    pub client_name: String,
    /// Client version announced during the handshake
    pub client_version: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            protocol_version: "2025-03-26".to_string(),
            client_name: "mcpflow".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Responses endpoint URL
    pub responses_url: String,
    /// Model or deployment name
    pub deployment: String,
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for the API key
    pub api_key_env: Option<String>,
    /// Stream reasoning summaries as thinking chunks
    pub show_thinking: bool,
    pub reasoning_effort: ReasoningEffort,
    pub verbosity: Verbosity,
    /// Maximum tokens to generate per round
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            responses_url: "https://api.openai.com/v1/responses".to_string(),
            deployment: "gpt-5.2".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            show_thinking: true,
            reasoning_effort: ReasoningEffort::Medium,
            verbosity: Verbosity::Medium,
            max_output_tokens: 16_000,
            timeout_secs: 300,
        }
    }
}

impl ModelConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }
}

/// Reasoning effort requested from the model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown reasoning effort '{}'", other)),
        }
    }
}

/// Output verbosity requested from the model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown verbosity '{}'", other)),
        }
    }
}

/// How a tool server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportKind {
    /// JSON-RPC over HTTP POST; replies may be JSON or an event stream
    #[default]
    #[serde(rename = "streamable-http")]
    StreamableHttp,
    /// Legacy event-stream servers; requests are still plain POSTs
    #[serde(rename = "sse")]
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::StreamableHttp => f.write_str("streamable-http"),
            TransportKind::Sse => f.write_str("sse"),
        }
    }
}

/// Configuration for one tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Endpoint URL
    pub url: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ServerConfig {
    /// Create a new streamable-http server config.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportKind::StreamableHttp,
            api_key: None,
        }
    }

    /// Set the transport kind.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Field path (e.g., "engine.max_tool_rounds")
    pub field: String,
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Build the layered figment: defaults, user config, project config,
    /// project-local config, then `MCPFLOW_` environment variables.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file(".mcpflow/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".mcpflow/config.local.toml"))
            .merge(Env::prefixed("MCPFLOW_").split("__"))
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.engine.max_tool_rounds == 0 {
            result.add_error("engine.max_tool_rounds", "max_tool_rounds must be greater than 0");
        }
        if self.engine.max_tool_rounds > 50 {
            result.add_warning(
                "engine.max_tool_rounds",
                "max_tool_rounds is very high (> 50), turns may run for a long time",
            );
        }
        if self.engine.tool_timeout_secs == 0 {
            result.add_error("engine.tool_timeout_secs", "tool_timeout_secs must be greater than 0");
        }

        if self.mcp.protocol_version.is_empty() {
            result.add_error("mcp.protocol_version", "Protocol version cannot be empty");
        }

        if !is_http_url(&self.model.responses_url) {
            result.add_error(
                "model.responses_url",
                "responses_url must start with http:// or https://",
            );
        }
        if self.model.deployment.is_empty() {
            result.add_error("model.deployment", "Deployment name cannot be empty");
        }
        if self.model.max_output_tokens == 0 {
            result.add_error("model.max_output_tokens", "max_output_tokens must be greater than 0");
        }
        if self.model.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(false) {
            result.add_warning("model.api_key", "API key is empty string");
        }

        for (i, server) in self.servers.iter().enumerate() {
            if !is_http_url(&server.url) {
                result.add_error(
                    format!("servers[{}].url", i),
                    "url must start with http:// or https://",
                );
            }
            if server.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(false) {
                result.add_warning(format!("servers[{}].api_key", i), "API key is empty string");
            }
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str())
            && !level.contains('=')
        {
            result.add_warning("logging.level", "Unrecognized log level, falling back to info");
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("mcpflow"))
            .unwrap_or_else(|| PathBuf::from("~/.config/mcpflow"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert_eq!(config.engine.max_tool_rounds, 10);
        assert_eq!(config.engine.tool_timeout_secs, 30);
    }

    #[test]
    fn test_zero_rounds_is_error() {
        let mut config = Config::default();
        config.engine.max_tool_rounds = 0;
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result.errors().iter().any(|e| e.field == "engine.max_tool_rounds"));
    }

    #[test]
    fn test_bad_server_url_is_error() {
        let mut config = Config::default();
        config.servers.push(ServerConfig::new("ftp://tools.local"));
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "servers[0].url"));
    }

    #[test]
    fn test_high_rounds_is_warning() {
        let mut config = Config::default();
        config.engine.max_tool_rounds = 100;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result.warnings().iter().any(|e| e.field == "engine.max_tool_rounds"));
    }

    #[test]
    fn test_server_config_deserializes_transport_names() {
        let server: ServerConfig =
            serde_json::from_str(r#"{"url":"https://a.example/mcp","transport":"sse"}"#).unwrap();
        assert_eq!(server.transport, TransportKind::Sse);

        let server: ServerConfig = serde_json::from_str(r#"{"url":"https://a.example/mcp"}"#).unwrap();
        assert_eq!(server.transport, TransportKind::StreamableHttp);
    }

    #[test]
    fn test_effort_and_verbosity_parse() {
        assert_eq!("HIGH".parse::<ReasoningEffort>(), Ok(ReasoningEffort::High));
        assert_eq!("low".parse::<Verbosity>(), Ok(Verbosity::Low));
        assert!("extreme".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir(".mcpflow")?;
            jail.create_file(
                ".mcpflow/config.toml",
                r#"
                [engine]
                max_tool_rounds = 4

                [[servers]]
                url = "https://tools.example.com/mcp"
                transport = "sse"
                "#,
            )?;
            jail.set_env("MCPFLOW_MODEL__DEPLOYMENT", "gpt-5-mini");

            let config = Config::load()?;
            assert_eq!(config.engine.max_tool_rounds, 4);
            assert_eq!(config.servers.len(), 1);
            assert_eq!(config.servers[0].transport, TransportKind::Sse);
            assert_eq!(config.model.deployment, "gpt-5-mini");
            assert_eq!(config.mcp.protocol_version, "2025-03-26");
            Ok(())
        });
    }
}
