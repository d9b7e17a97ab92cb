//! Agent bootstrap sequencing
//!
//! Drives one launch from nothing to a running agent process: clear any
//! stale tunnel, start a fresh one for the role's port, wait for its
//! management API, resolve the public endpoint, then start the agent with
//! that endpoint injected. The sequence never aborts once started; tunnel
//! steps degrade rather than fail, and the agent is always launched.

use thiserror::Error;
use tokio::process::Child;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AgentLaunchConfig;
use crate::config::{LaunchpadConfig, Role};
use crate::tunnel::{await_management_api, kill_stale, resolve, ResolvedEndpoint, TunnelProcess};

/// Errors that can occur during a bootstrap run.
///
/// Tunnel failures are absorbed by the resolver's fallback; only the agent
/// launch itself can fail the sequence.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Failed to start agent process '{command}': {source}")]
    AgentSpawnFailed {
        command: String,
        source: std::io::Error,
    },
}

/// Result type for sequencer operations
pub type SequencerResult<T> = Result<T, SequencerError>;

/// Phases of one bootstrap run, strictly linear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    KillingStaleTunnel,
    StartingTunnel,
    AwaitingTunnelReady,
    ResolvingEndpoint,
    LaunchingAgent,
    Running,
}

/// Outcome of one bootstrap run.
///
/// The caller now owns the agent child and, when a tunnel was started, the
/// tunnel handle; the sequencer does not supervise either.
pub struct Bootstrapped {
    /// Running agent process
    pub agent: Child,
    /// Tunnel handle, None when the tunnel was skipped or failed to start
    pub tunnel: Option<TunnelProcess>,
    /// The endpoint the agent was configured with
    pub endpoint: ResolvedEndpoint,
}

/// Orchestrates one agent launch
pub struct Sequencer {
    launch_id: Uuid,
    phase: Phase,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            launch_id: Uuid::new_v4(),
            phase: Phase::Idle,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug!(launch = %self.launch_id, "{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Run the full sequence for `role`.
    ///
    /// Exactly one endpoint is resolved per run, always before the agent
    /// starts. With `use_tunnel` false the tunnel steps are skipped and the
    /// localhost endpoint is constructed directly; the management API is
    /// never consulted, so a tunnel client left running by someone else
    /// cannot leak in.
    pub async fn run(
        mut self,
        role: Role,
        config: &LaunchpadConfig,
        extra_args: Vec<String>,
        use_tunnel: bool,
    ) -> SequencerResult<Bootstrapped> {
        let port = role.agent_port();
        let tunnel_settings = config.tunnel.settings();

        let tunnel = if use_tunnel {
            self.advance(Phase::KillingStaleTunnel);
            kill_stale(&tunnel_settings.binary).await;

            self.advance(Phase::StartingTunnel);
            match TunnelProcess::start(port, &tunnel_settings) {
                Ok(tunnel) => {
                    self.advance(Phase::AwaitingTunnelReady);
                    if let Err(e) = await_management_api(&tunnel_settings).await {
                        // Resolution will fall back; the launch still proceeds.
                        warn!(launch = %self.launch_id, "Tunnel not ready, continuing degraded: {}", e);
                    }
                    Some(tunnel)
                }
                Err(e) => {
                    warn!(launch = %self.launch_id, "Tunnel could not be started, resolving locally: {}", e);
                    None
                }
            }
        } else {
            debug!(launch = %self.launch_id, "Tunnel disabled, using local endpoint");
            None
        };

        self.advance(Phase::ResolvingEndpoint);
        let endpoint = if use_tunnel {
            resolve(
                port,
                &tunnel_settings.management_addr,
                tunnel_settings.request_timeout,
            )
            .await
        } else {
            ResolvedEndpoint::localhost(port)
        };

        self.advance(Phase::LaunchingAgent);
        let launch = AgentLaunchConfig::new(
            config.agent.command.as_str(),
            port,
            role.admin_port(),
            endpoint.clone(),
        )
        .with_label(role.label())
        .with_extra_args([config.agent.args.clone(), extra_args].concat());

        let agent = launch
            .to_command()
            .spawn()
            .map_err(|source| SequencerError::AgentSpawnFailed {
                command: launch.command.clone(),
                source,
            })?;

        self.advance(Phase::Running);
        info!(
            launch = %self.launch_id,
            "Agent '{}' running on port {} with endpoint {} ({})",
            launch.label,
            port,
            endpoint.url,
            endpoint.outcome.as_str()
        );

        Ok(Bootstrapped {
            agent,
            tunnel,
            endpoint,
        })
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
