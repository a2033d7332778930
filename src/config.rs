//! WolfAdmin Configuration
//!
//! This module provides configuration structures for a WolfAdmin node.
//! The `[server]` table is the cluster-wide configuration document served
//! to peers through `Admin.GetConfig`; its shape is opaque to this crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::quorum;
use crate::rpc::Credential;

/// Main WolfAdmin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfAdminConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Shared cluster credential
    pub credential: Credential,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Served configuration document
    #[serde(default)]
    pub server: Option<toml::Table>,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address peers use to reach this node (host:port)
    pub address: String,

    /// Address to bind the admin RPC listener (defaults to `address`)
    #[serde(default)]
    pub bind_address: Option<String>,
}

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Storage endpoints of the whole cluster, local ones included
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Transport connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Transport request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WolfAdminConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfAdminConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration back to TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.address.is_empty() {
            return Err(crate::Error::Config("node.address cannot be empty".into()));
        }

        if self.credential.access_key.is_empty() {
            return Err(crate::Error::Config(
                "credential.access_key cannot be empty".into(),
            ));
        }

        if self.credential.secret_key.is_empty() {
            return Err(crate::Error::Config(
                "credential.secret_key cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Get the bind address (or the node address if not set)
    pub fn bind_address(&self) -> &str {
        self.node
            .bind_address
            .as_deref()
            .unwrap_or(&self.node.address)
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.request_timeout_ms)
    }

    /// Distinct node count implied by the endpoint list (local node included)
    pub fn node_count(&self) -> usize {
        let mut seen = vec![self.node.address.as_str()];
        let hosts: Vec<String> = self
            .cluster
            .endpoints
            .iter()
            .filter_map(|ep| endpoint_host(ep))
            .collect();
        for host in &hosts {
            if !seen.contains(&host.as_str()) {
                seen.push(host);
            }
        }
        seen.len()
    }

    /// Write quorum for this cluster size
    pub fn write_quorum(&self) -> usize {
        quorum::write_quorum(self.node_count())
    }
}

/// Extract the `host:port` part of an endpoint.
///
/// Accepts `scheme://host:port/path` and plain `host:port`. Local path
/// endpoints (`/export`, `./data`) carry no host and yield `None`.
pub fn endpoint_host(endpoint: &str) -> Option<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() || endpoint.starts_with('/') || endpoint.starts_with('.') {
        return None;
    }

    let rest = match endpoint.split_once("://") {
        Some((_, rest)) => rest,
        None => endpoint,
    };

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
