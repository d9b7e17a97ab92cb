//! Runtime settings
//!
//! The role port table plus launchpad.toml: tunnel client, agent command,
//! and proxy bind settings. A missing config file yields defaults, which is
//! how the launcher is normally run.

use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::tunnel::TunnelSettings;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "launchpad.toml";

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Agent role, each with a fixed transport/admin port pair.
///
/// Ports are implicit per role; the CLI never takes a raw port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    Issuer,
    Verifier,
    Registrar,
}

impl Role {
    /// Port the agent's DIDComm transport binds to
    pub fn agent_port(self) -> u16 {
        match self {
            Role::Issuer => 8020,
            Role::Verifier => 8030,
            Role::Registrar => 8040,
        }
    }

    /// Port the agent's admin API binds to
    pub fn admin_port(self) -> u16 {
        self.agent_port() + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Issuer => "issuer",
            Role::Verifier => "verifier",
            Role::Registrar => "registrar",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tunnel client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// Tunnel client binary name
    #[serde(default = "default_tunnel_binary")]
    pub binary: String,
    /// Base URL of the tunnel management API
    #[serde(default = "default_management_addr")]
    pub management_addr: String,
    /// Budget for the management API to become queryable, in seconds
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Per-request timeout against the management API, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_tunnel_binary() -> String {
    "ngrok".to_string()
}

fn default_management_addr() -> String {
    "http://127.0.0.1:4040".to_string()
}

fn default_ready_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    3
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            binary: default_tunnel_binary(),
            management_addr: default_management_addr(),
            ready_timeout_secs: default_ready_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TunnelConfig {
    /// Convert to the settings struct the tunnel module consumes
    pub fn settings(&self) -> TunnelSettings {
        TunnelSettings {
            binary: self.binary.clone(),
            management_addr: self.management_addr.clone(),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Agent process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Agent executable to launch
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Arguments prepended before caller-supplied extra args
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_agent_command() -> String {
    "aries-agent".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: Vec::new(),
        }
    }
}

/// Invitation proxy bind configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Bind address
    #[serde(default = "default_proxy_bind")]
    pub bind: String,
    /// Listen port
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    9080
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_proxy_bind(),
            port: default_proxy_port(),
        }
    }
}

impl ProxyConfig {
    /// Get the socket address string for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Complete launcher configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchpadConfig {
    /// Tunnel client settings
    #[serde(default)]
    pub tunnel: TunnelConfig,
    /// Agent process settings
    #[serde(default)]
    pub agent: AgentConfig,
    /// Invitation proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl LaunchpadConfig {
    /// Load configuration from `path`, or `launchpad.toml` in the working
    /// directory when none is given. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: LaunchpadConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
