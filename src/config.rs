//! Configuration system for the agent router
//!
//! Configuration is read from a TOML file. Every section has defaults, so an
//! empty file (or no file at all) yields a working local setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

/// Identity of this router process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterSection {
    /// Router identifier (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_router_id")]
    pub id: String,
    /// Human readable description, published on the dynamic agent card
    #[serde(default = "default_router_description")]
    pub description: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            id: default_router_id(),
            description: default_router_description(),
        }
    }
}

fn default_router_id() -> String {
    "a2a-router".to_string()
}

fn default_router_description() -> String {
    "Routes free-text requests to remote A2A agents".to_string()
}

/// Where agent cards are loaded from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectorySection {
    /// Directory containing one JSON agent card per file
    #[serde(default = "default_cards_dir")]
    pub cards_dir: PathBuf,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            cards_dir: default_cards_dir(),
        }
    }
}

fn default_cards_dir() -> PathBuf {
    PathBuf::from("agent_cards")
}

/// Discovery mode selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Resolve against the in-process directory snapshot
    Local,
    /// Resolve through a remote directory service
    Remote,
}

/// Discovery client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_mode")]
    pub mode: DiscoveryMode,
    /// Base URL of the remote directory service (required when mode = "remote")
    pub base_url: Option<String>,
    /// Request timeout in milliseconds (default: 10000)
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
    /// URL of the statically known card used when the remote directory is down
    #[serde(default = "default_fallback_card_url")]
    pub fallback_card_url: String,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            mode: default_discovery_mode(),
            base_url: None,
            timeout_ms: default_discovery_timeout_ms(),
            fallback_card_url: default_fallback_card_url(),
        }
    }
}

impl DiscoverySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_discovery_mode() -> DiscoveryMode {
    DiscoveryMode::Local
}

fn default_discovery_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_card_url() -> String {
    "http://localhost:10110/".to_string()
}

/// When a rejected envelope variant is retried with the next one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPolicy {
    /// Only "method not found" (-32601) and "invalid params" (-32602)
    #[default]
    CodeGated,
    /// Any JSON-RPC error or non-2xx status
    AnyError,
}

/// Protocol bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Per-request timeout in milliseconds (default: 30000)
    #[serde(default = "default_bridge_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional path appended to the card url for the RPC endpoint
    pub rpc_path: Option<String>,
    #[serde(default)]
    pub negotiation: NegotiationPolicy,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_bridge_timeout_ms(),
            rpc_path: None,
            negotiation: NegotiationPolicy::default(),
        }
    }
}

impl BridgeSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_bridge_timeout_ms() -> u64 {
    30_000
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL advertised on the dynamic agent card
    pub public_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerSection {
    /// Base URL other processes should use to reach this one
    pub fn advertised_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10120
}

/// Record expiration for the conversation/task/message store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistenceSection {
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
    #[serde(default = "default_message_ttl")]
    pub message_ttl_secs: u64,
    #[serde(default = "default_task_ttl")]
    pub task_ttl_secs: u64,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            conversation_ttl_secs: default_conversation_ttl(),
            message_ttl_secs: default_message_ttl(),
            task_ttl_secs: default_task_ttl(),
        }
    }
}

fn default_conversation_ttl() -> u64 {
    86_400
}

fn default_message_ttl() -> u64 {
    86_400
}

fn default_task_ttl() -> u64 {
    3_600
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid router ID format: {0}")]
    InvalidRouterId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RouterConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RouterConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `ROUTER_PORT` overrides the configured server port
    fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("ROUTER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_router_id(&self.router.id)?;

        if self.discovery.mode == DiscoveryMode::Remote {
            let base_url = self.discovery.base_url.as_deref().ok_or_else(|| {
                ConfigError::InvalidConfig(
                    "Remote discovery requires [discovery] base_url".to_string(),
                )
            })?;
            if !crate::card::is_well_formed_url(base_url) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Discovery base_url '{base_url}' must be an absolute http(s) URL"
                )));
            }
        }

        if !crate::card::is_well_formed_url(&self.discovery.fallback_card_url) {
            return Err(ConfigError::InvalidConfig(format!(
                "Fallback card url '{}' must be an absolute http(s) URL",
                self.discovery.fallback_card_url
            )));
        }

        if self.discovery.timeout_ms == 0 || self.bridge.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[router]
id = "test-router"

[discovery]
mode = "remote"
base_url = "http://localhost:10101"
timeout_ms = 2000

[bridge]
timeout_ms = 5000
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate router ID format
fn validate_router_id(router_id: &str) -> Result<(), ConfigError> {
    let valid_chars = router_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if router_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidRouterId(format!(
            "Router ID '{router_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
