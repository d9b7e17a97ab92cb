//! Invitation forwarding
//!
//! A single inbound route that forwards invitation requests to the local
//! agent admin API and returns its JSON response unmodified. No
//! transformation, auth, or error translation is performed; an unreachable
//! agent surfaces as a 502 to the caller.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::tunnel::ResolvedEndpoint;

/// Admin API path that creates a connection invitation
const CREATE_INVITATION_PATH: &str = "/connections/create-invitation";

/// Shared state for the proxy routes
#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    invitation_url: String,
    role: String,
    endpoint_url: String,
    resolution: &'static str,
}

impl ProxyState {
    /// Create proxy state targeting the local agent admin API on `admin_port`
    pub fn new(role: impl Into<String>, admin_port: u16, endpoint: &ResolvedEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            invitation_url: format!("http://127.0.0.1:{}{}", admin_port, CREATE_INVITATION_PATH),
            role: role.into(),
            endpoint_url: endpoint.url.clone(),
            resolution: endpoint.outcome.as_str(),
        }
    }

    /// Override the upstream invitation URL
    pub fn with_invitation_url(mut self, url: impl Into<String>) -> Self {
        self.invitation_url = url.into();
        self
    }
}

/// Build the proxy router
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/invitation", get(invitation_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Forward to the agent's create-invitation endpoint and relay its JSON.
async fn invitation_handler(State(state): State<ProxyState>) -> Response {
    debug!("Forwarding invitation request to {}", state.invitation_url);

    let upstream = state
        .client
        .post(&state.invitation_url)
        .json(&serde_json::json!({}))
        .send()
        .await;

    match upstream {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match response.json::<serde_json::Value>().await {
                Ok(body) => (status, Json(body)).into_response(),
                Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
            }
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// Report which endpoint this launch resolved and how.
async fn health_handler(State(state): State<ProxyState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "role": state.role,
        "endpoint": state.endpoint_url,
        "resolution": state.resolution,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::Resolution;

    fn endpoint() -> ResolvedEndpoint {
        ResolvedEndpoint {
            url: "https://abc.ngrok.io".to_string(),
            outcome: Resolution::Matched,
        }
    }

    /// Serve `router` on an ephemeral port, returning its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_reports_resolution() {
        let state = ProxyState::new("issuer", 8021, &endpoint());
        let base = serve(build_router(state)).await;

        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["role"], "issuer");
        assert_eq!(body["endpoint"], "https://abc.ngrok.io");
        assert_eq!(body["resolution"], "matched");
    }

    #[tokio::test]
    async fn test_invitation_passthrough() {
        // Stand-in agent admin API answering the create-invitation POST.
        let admin = Router::new().route(
            CREATE_INVITATION_PATH,
            axum::routing::post(|| async {
                Json(serde_json::json!({
                    "connection_id": "b7c3",
                    "invitation": {"label": "issuer"}
                }))
            }),
        );
        let admin_base = serve(admin).await;

        let state = ProxyState::new("issuer", 8021, &endpoint())
            .with_invitation_url(format!("{}{}", admin_base, CREATE_INVITATION_PATH));
        let base = serve(build_router(state)).await;

        let response = reqwest::get(format!("{}/invitation", base)).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["connection_id"], "b7c3");
        assert_eq!(body["invitation"]["label"], "issuer");
    }

    #[tokio::test]
    async fn test_invitation_upstream_down_is_502() {
        let state = ProxyState::new("issuer", 8021, &endpoint())
            .with_invitation_url("http://127.0.0.1:1/connections/create-invitation");
        let base = serve(build_router(state)).await;

        let response = reqwest::get(format!("{}/invitation", base)).await.unwrap();
        assert_eq!(response.status().as_u16(), 502);
    }
}
