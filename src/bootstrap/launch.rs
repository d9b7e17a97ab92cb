//! Agent launch configuration
//!
//! Everything needed to start one agent process: the transport port, the
//! resolved public endpoint, and caller-supplied arguments forwarded
//! verbatim. A launch config cannot be built without a resolved endpoint,
//! so the agent never starts with an unset or stale one.

use tokio::process::Command;

use crate::tunnel::ResolvedEndpoint;

/// Configuration for one agent process invocation, consumed exactly once
#[derive(Debug, Clone)]
pub struct AgentLaunchConfig {
    /// Agent executable
    pub command: String,
    /// DIDComm transport port, passed as the first argument
    pub port: u16,
    /// Admin API port, injected through the environment
    pub admin_port: u16,
    /// Public endpoint resolved for this launch
    pub endpoint: ResolvedEndpoint,
    /// Role label, for the agent's own logging
    pub label: String,
    /// Arguments forwarded verbatim after the port
    pub extra_args: Vec<String>,
}

impl AgentLaunchConfig {
    /// Create a launch config with no extra arguments
    pub fn new(
        command: impl Into<String>,
        port: u16,
        admin_port: u16,
        endpoint: ResolvedEndpoint,
    ) -> Self {
        Self {
            command: command.into(),
            port,
            admin_port,
            endpoint,
            label: "agent".to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Set the role label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set arguments forwarded verbatim to the agent
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Build the process invocation.
    ///
    /// The numeric port is the first argument, extra args follow verbatim,
    /// and the endpoint and ports are injected through the environment the
    /// way the agent framework reads them. The child is killed if its
    /// handle is dropped, so an error between launch and handoff cannot
    /// orphan an agent configured with a dead tunnel endpoint.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command
            .arg(self.port.to_string())
            .args(&self.extra_args)
            .env("ENDPOINT", &self.endpoint.url)
            .env("AGENT_PORT", self.port.to_string())
            .env("ADMIN_PORT", self.admin_port.to_string())
            .env("AGENT_LABEL", &self.label)
            .kill_on_drop(true);
        command
    }
}
