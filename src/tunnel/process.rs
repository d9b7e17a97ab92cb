//! Tunnel process control
//!
//! Owns the lifetime of the local tunnel client (`ngrok` by default) as a
//! managed handle. Acquisition is kill-then-start: any stale process for the
//! same binary is terminated best-effort, then a fresh one is spawned bound
//! to the target port. Readiness is bounded polling of the management API
//! with backoff, surfaced as a distinguishable timeout error rather than a
//! silent miss. Dropping the handle kills the child.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Errors that can occur during tunnel process control
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to spawn tunnel process '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Tunnel management API not ready within {0:?}")]
    ReadyTimeout(Duration),
}

/// Result type for tunnel process operations
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Settings controlling tunnel acquisition and readiness polling
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Tunnel client binary name
    pub binary: String,
    /// Base URL of the tunnel management API
    pub management_addr: String,
    /// Overall budget for the management API to become queryable
    pub ready_timeout: Duration,
    /// Per-request timeout against the management API
    pub request_timeout: Duration,
}

/// Handle to a running tunnel process.
///
/// The child is spawned with `kill_on_drop`, so releasing the handle (via
/// [`TunnelProcess::shutdown`] or by dropping it) terminates the tunnel.
pub struct TunnelProcess {
    child: Child,
    port: u16,
}

impl TunnelProcess {
    /// Start a tunnel exposing `port`.
    ///
    /// The process is detached: nothing is read from it, its only consumed
    /// side effect is populating the management API.
    pub fn start(port: u16, settings: &TunnelSettings) -> TunnelResult<Self> {
        let mut command = Command::new(&settings.binary);
        command
            .arg("http")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| TunnelError::SpawnFailed {
            command: settings.binary.clone(),
            source,
        })?;

        info!("Tunnel process '{}' started for port {}", settings.binary, port);
        Ok(Self { child, port })
    }

    /// Kill the tunnel child and reap it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill tunnel process: {}", e);
        } else {
            debug!("Tunnel process for port {} terminated", self.port);
        }
    }
}

/// Best-effort termination of a previously running tunnel process.
///
/// Absence of a process to kill is not an error; the step is idempotent.
pub async fn kill_stale(binary: &str) {
    match Command::new("pkill").arg("-x").arg(binary).status().await {
        Ok(status) if status.success() => info!("Killed stale '{}' process", binary),
        Ok(_) => debug!("No stale '{}' process to kill", binary),
        Err(e) => warn!("Could not run pkill for '{}': {}", binary, e),
    }
}

/// Poll the management API until it answers or the ready budget elapses.
///
/// Backoff doubles from 200ms up to 2s between attempts. A timeout is
/// recoverable: the caller may proceed and let resolution degrade.
pub async fn await_management_api(settings: &TunnelSettings) -> TunnelResult<()> {
    let url = format!(
        "{}/api/tunnels",
        settings.management_addr.trim_end_matches('/')
    );
    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()?;

    let deadline = tokio::time::Instant::now() + settings.ready_timeout;
    let mut delay = Duration::from_millis(200);

    loop {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Tunnel management API ready at {}", url);
                return Ok(());
            }
            Ok(response) => {
                debug!("Management API answered {} while starting", response.status())
            }
            Err(e) => debug!("Management API not up yet: {}", e),
        }

        if tokio::time::Instant::now() + delay > deadline {
            return Err(TunnelError::ReadyTimeout(settings.ready_timeout));
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    fn settings(management_addr: &str) -> TunnelSettings {
        TunnelSettings {
            binary: "ngrok".to_string(),
            management_addr: management_addr.to_string(),
            ready_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_start_missing_binary_fails() {
        let settings = TunnelSettings {
            binary: "definitely-not-a-real-tunnel-binary".to_string(),
            ..settings("http://127.0.0.1:4040")
        };
        let result = TunnelProcess::start(8020, &settings);
        assert!(matches!(result, Err(TunnelError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_await_management_api_times_out() {
        let result = await_management_api(&settings("http://127.0.0.1:1")).await;
        assert!(matches!(result, Err(TunnelError::ReadyTimeout(_))));
    }

    #[tokio::test]
    async fn test_await_management_api_ready() {
        let app = Router::new().route("/api/tunnels", get(|| async { r#"{"tunnels":[]}"# }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let result = await_management_api(&settings(&format!("http://{}", addr))).await;
        assert!(result.is_ok());
    }
}
