//! Tunnel endpoint resolution
//!
//! Queries the local tunnel-management API for active public tunnels and
//! picks the best match for a target local port. Resolution never fails:
//! an unreachable API, a malformed response, or an empty tunnel list all
//! degrade to a localhost endpoint so the launch can proceed without
//! network egress.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the endpoint was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A tunnel whose local address matched the target port.
    Matched,
    /// No port match; the first active tunnel was used.
    FallbackFirst,
    /// No usable tunnel; a localhost endpoint was constructed.
    FallbackLocalhost,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Matched => "matched",
            Resolution::FallbackFirst => "fallback-first",
            Resolution::FallbackLocalhost => "fallback-localhost",
        }
    }
}

/// The public endpoint resolved for one launch.
///
/// The URL is normalized (at most one trailing slash stripped) and tagged
/// with how it was chosen, so callers can tell "tunnel found" apart from
/// "degraded to local".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Normalized base URL, no trailing slash
    pub url: String,
    /// Selection path that produced this URL
    pub outcome: Resolution,
}

impl ResolvedEndpoint {
    /// The degraded endpoint for a service reachable only on this host
    pub fn localhost(port: u16) -> Self {
        Self {
            url: format!("http://127.0.0.1:{}", port),
            outcome: Resolution::FallbackLocalhost,
        }
    }

    /// Whether the endpoint is publicly reachable (came from a tunnel)
    pub fn is_public(&self) -> bool {
        self.outcome != Resolution::FallbackLocalhost
    }
}

/// One active tunnel as reported by the management API
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelDescriptor {
    /// Public URL the tunnel is reachable at
    #[serde(default)]
    pub public_url: String,
    /// The local target the tunnel forwards to
    #[serde(default)]
    pub config: TunnelTarget,
    /// Tunnel protocol ("http" or "https")
    #[serde(default)]
    pub proto: String,
}

/// Local forwarding target of a tunnel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelTarget {
    /// host:port (possibly scheme-prefixed) the tunnel points at
    #[serde(default)]
    pub addr: String,
}

/// Top-level management API response shape
#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelDescriptor>,
}

/// Resolve the public endpoint for a service bound to `target_port`.
///
/// Queries `{management_addr}/api/tunnels`, applies the selection policy
/// (exact port match, then first tunnel, then localhost fallback) and logs
/// which endpoint was chosen. Always returns an endpoint.
pub async fn resolve(
    target_port: u16,
    management_addr: &str,
    request_timeout: Duration,
) -> ResolvedEndpoint {
    let descriptors = fetch_tunnels(management_addr, request_timeout).await;
    let resolved = select_tunnel(&descriptors, target_port);

    match resolved.outcome {
        Resolution::Matched => {
            info!("Tunnel matches local port {}: {}", target_port, resolved.url)
        }
        Resolution::FallbackFirst => info!(
            "No tunnel for port {}, using first active tunnel: {}",
            target_port, resolved.url
        ),
        Resolution::FallbackLocalhost => {
            warn!("No usable tunnel, using local endpoint {}", resolved.url)
        }
    }

    resolved
}

/// Fetch the current tunnel list, softly failing to an empty set.
async fn fetch_tunnels(management_addr: &str, request_timeout: Duration) -> Vec<TunnelDescriptor> {
    let url = format!("{}/api/tunnels", management_addr.trim_end_matches('/'));

    let client = match reqwest::Client::builder().timeout(request_timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Could not build HTTP client: {}", e);
            return Vec::new();
        }
    };

    match client.get(&url).send().await {
        Ok(response) => match response.json::<TunnelList>().await {
            Ok(list) => {
                for tunnel in &list.tunnels {
                    debug!(
                        "Active tunnel {} ({}) -> {}",
                        tunnel.public_url, tunnel.proto, tunnel.config.addr
                    );
                }
                list.tunnels
            }
            Err(e) => {
                warn!("Malformed tunnel list from {}: {}", url, e);
                Vec::new()
            }
        },
        Err(e) => {
            warn!("Tunnel management API unreachable at {}: {}", url, e);
            Vec::new()
        }
    }
}

/// Apply the selection policy to a descriptor set.
///
/// Precedence: (a) first descriptor whose local address ends with
/// `:{target_port}`, since multiple tunnels may be active for different
/// local services; (b) the first descriptor, on the assumption that only
/// one tunnel is intended; (c) a localhost endpoint when the set is empty
/// or the chosen tunnel carries no public URL.
pub fn select_tunnel(descriptors: &[TunnelDescriptor], target_port: u16) -> ResolvedEndpoint {
    let port_suffix = format!(":{}", target_port);

    let (candidate, outcome) = match descriptors
        .iter()
        .find(|d| d.config.addr.ends_with(&port_suffix))
    {
        Some(matched) => (Some(matched), Resolution::Matched),
        None => (descriptors.first(), Resolution::FallbackFirst),
    };

    match candidate {
        Some(descriptor) if !descriptor.public_url.is_empty() => ResolvedEndpoint {
            url: normalize_url(&descriptor.public_url),
            outcome,
        },
        _ => ResolvedEndpoint::localhost(target_port),
    }
}

/// Strip exactly one trailing slash if present.
///
/// Not recursive: a URL ending in `//` keeps one slash.
pub fn normalize_url(url: &str) -> String {
    match url.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    fn descriptor(public_url: &str, addr: &str) -> TunnelDescriptor {
        TunnelDescriptor {
            public_url: public_url.to_string(),
            config: TunnelTarget {
                addr: addr.to_string(),
            },
            proto: "https".to_string(),
        }
    }

    /// Serve a fixed body at /api/tunnels on an ephemeral port.
    async fn serve_fixture(body: &'static str) -> String {
        let app = Router::new().route("/api/tunnels", get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_port_match_takes_precedence() {
        let descriptors = vec![
            descriptor("https://other.ngrok.io", "http://localhost:9000"),
            descriptor("https://mine.ngrok.io", "http://localhost:8080"),
        ];
        let resolved = select_tunnel(&descriptors, 8080);
        assert_eq!(resolved.url, "https://mine.ngrok.io");
        assert_eq!(resolved.outcome, Resolution::Matched);
    }

    #[test]
    fn test_first_entry_when_no_port_match() {
        let descriptors = vec![
            descriptor("https://first.ngrok.io", "http://localhost:9000"),
            descriptor("https://second.ngrok.io", "http://localhost:9001"),
        ];
        let resolved = select_tunnel(&descriptors, 8080);
        assert_eq!(resolved.url, "https://first.ngrok.io");
        assert_eq!(resolved.outcome, Resolution::FallbackFirst);
    }

    #[test]
    fn test_empty_set_falls_back_to_localhost() {
        let resolved = select_tunnel(&[], 8090);
        assert_eq!(resolved.url, "http://127.0.0.1:8090");
        assert_eq!(resolved.outcome, Resolution::FallbackLocalhost);
        assert!(!resolved.is_public());
    }

    #[test]
    fn test_blank_public_url_falls_back_to_localhost() {
        let descriptors = vec![descriptor("", "http://localhost:8080")];
        let resolved = select_tunnel(&descriptors, 8080);
        assert_eq!(resolved.url, "http://127.0.0.1:8080");
        assert_eq!(resolved.outcome, Resolution::FallbackLocalhost);
    }

    #[test]
    fn test_normalize_strips_single_trailing_slash() {
        assert_eq!(normalize_url("https://abc.ngrok.io/"), "https://abc.ngrok.io");
    }

    #[test]
    fn test_normalize_without_trailing_slash_is_identity() {
        assert_eq!(normalize_url("https://abc.ngrok.io"), "https://abc.ngrok.io");
        let once = normalize_url("https://abc.ngrok.io");
        assert_eq!(normalize_url(&once), once);
    }

    #[test]
    fn test_normalize_keeps_one_of_two_slashes() {
        assert_eq!(normalize_url("https://abc.ngrok.io//"), "https://abc.ngrok.io/");
    }

    #[tokio::test]
    async fn test_resolve_with_matching_tunnel() {
        let addr = serve_fixture(
            r#"{"tunnels":[{"public_url":"https://abc123.ngrok.io","config":{"addr":"http://localhost:8080"},"proto":"https"}]}"#,
        )
        .await;
        let resolved = resolve(8080, &addr, Duration::from_secs(2)).await;
        assert_eq!(resolved.url, "https://abc123.ngrok.io");
        assert_eq!(resolved.outcome, Resolution::Matched);
    }

    #[tokio::test]
    async fn test_resolve_first_tunnel_strips_trailing_slash() {
        let addr = serve_fixture(
            r#"{"tunnels":[{"public_url":"https://xyz.ngrok.io/","config":{"addr":"http://localhost:9000"},"proto":"https"}]}"#,
        )
        .await;
        let resolved = resolve(8080, &addr, Duration::from_secs(2)).await;
        assert_eq!(resolved.url, "https://xyz.ngrok.io");
        assert_eq!(resolved.outcome, Resolution::FallbackFirst);
    }

    #[tokio::test]
    async fn test_resolve_unreachable_api_falls_back() {
        let resolved = resolve(8090, "http://127.0.0.1:1", Duration::from_millis(300)).await;
        assert_eq!(resolved.url, "http://127.0.0.1:8090");
        assert_eq!(resolved.outcome, Resolution::FallbackLocalhost);
    }

    #[tokio::test]
    async fn test_resolve_malformed_response_falls_back() {
        let addr = serve_fixture("not json at all").await;
        let resolved = resolve(8080, &addr, Duration::from_secs(2)).await;
        assert_eq!(resolved.url, "http://127.0.0.1:8080");
        assert_eq!(resolved.outcome, Resolution::FallbackLocalhost);
    }
}
