//! Agent Launchpad
//!
//! Starts identity agents (issuer, verifier, registrar) behind a
//! tunnel-backed public endpoint. Each launch clears any stale tunnel,
//! starts a fresh one for the role's port, resolves the public URL from the
//! tunnel management API (falling back to localhost), and launches the
//! agent with that endpoint injected. The invitation-forwarding route is
//! then served until shutdown.

mod bootstrap;
mod config;
mod proxy;
mod tunnel;

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bootstrap::{Bootstrapped, Sequencer};
use config::{LaunchpadConfig, Role};
use proxy::{build_router, ProxyState};

/// Agent Launchpad
///
/// Launches identity agents behind a tunnel-backed public endpoint
#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(version, about, long_about = None)]
struct Args {
    /// Agent role to launch
    #[arg(value_enum)]
    role: Role,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a launchpad.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the tunnel and use a localhost endpoint
    #[arg(long)]
    no_tunnel: bool,

    /// Extra arguments forwarded verbatim to the agent process
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    agent_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Agent Launchpad v{}", env!("CARGO_PKG_VERSION"));

    let config = LaunchpadConfig::load(args.config.as_deref())?;

    // Bootstrap: tunnel, endpoint resolution, agent launch
    let Bootstrapped {
        mut agent,
        tunnel,
        endpoint,
    } = Sequencer::new()
        .run(args.role, &config, args.agent_args, !args.no_tunnel)
        .await?;

    if !endpoint.is_public() {
        warn!("Endpoint is local only; agents outside this host will not reach it");
    }

    // Serve the invitation-forwarding route until shutdown
    let state = ProxyState::new(args.role.label(), args.role.admin_port(), &endpoint);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.proxy.socket_addr()).await?;
    info!("Invitation route listening on {}", config.proxy.socket_addr());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Initiating graceful shutdown...");
    if let Some(tunnel) = tunnel {
        tunnel.shutdown().await;
    }
    if let Err(e) = agent.kill().await {
        warn!("Failed to kill agent process: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
