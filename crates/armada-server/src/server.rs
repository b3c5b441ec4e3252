//! `FleetServer`: axum HTTP + WebSocket server around the fleet manager.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::info;

use armada_fleet::auth::AcceptAll;
use armada_fleet::heartbeat::spawn_heartbeat_monitor;
use armada_fleet::{Authenticator, FleetManager};

use crate::auth::SharedSecretAuthenticator;
use crate::health::{self, HealthResponse};
use crate::session::run_edge_session;
use crate::settings::ServerSettings;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The fleet manager.
    pub manager: Arc<FleetManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The fleet manager server.
pub struct FleetServer {
    settings: ServerSettings,
    manager: Arc<FleetManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl FleetServer {
    /// Create a server from settings.
    ///
    /// An empty shared secret selects the accept-all authenticator
    /// (development only); otherwise credentials are checked against it.
    #[must_use]
    pub fn new(settings: ServerSettings) -> Self {
        let auth: Arc<dyn Authenticator> = if settings.shared_secret.is_empty() {
            Arc::new(AcceptAll)
        } else {
            Arc::new(SharedSecretAuthenticator::new(settings.shared_secret.clone()))
        };
        let manager = Arc::new(FleetManager::new(settings.manager.clone(), auth));
        let shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&manager)));
        Self {
            settings,
            manager,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            manager: Arc::clone(&self.manager),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/healthz", get(healthz_handler))
            .route("/connect", get(connect_handler))
            .route("/edges", get(list_edges_handler))
            .route("/edges/{id}", get(edge_status_handler))
            .with_state(state)
    }

    /// Bind and serve; returns the bound address and the serve task.
    ///
    /// Also starts the heartbeat monitor; both stop when the shutdown
    /// coordinator fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind((
            self.settings.host.as_str(),
            self.settings.port,
        ))
        .await?;
        let addr = listener.local_addr()?;

        let _ = spawn_heartbeat_monitor(Arc::clone(&self.manager), self.shutdown.token());

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                token.cancelled().await;
            });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "server error");
            }
        });

        info!(%addr, "fleet server listening");
        Ok((addr, handle))
    }

    /// The fleet manager.
    pub fn manager(&self) -> &Arc<FleetManager> {
        &self.manager
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// GET /healthz
async fn healthz_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.manager.connected_count();
    Json(health::health_check(state.start_time, connected))
}

/// GET /connect, upgraded to the WebSocket edge stream.
async fn connect_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let manager = Arc::clone(&state.manager);
    ws.on_upgrade(move |socket| run_edge_session(socket, manager))
}

/// Query parameters for the directory listing.
#[derive(Debug, Default, Deserialize)]
struct ListEdgesParams {
    #[serde(default)]
    page_size: Option<i64>,
    #[serde(default)]
    page_token: Option<String>,
}

/// GET /edges
async fn list_edges_handler(
    State(state): State<AppState>,
    Query(params): Query<ListEdgesParams>,
) -> impl IntoResponse {
    let page = state.manager.list_edges(
        params.page_size.unwrap_or(0),
        params.page_token.as_deref().unwrap_or(""),
    );
    Json(page)
}

/// GET /edges/{id}
async fn edge_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.manager.edge_status(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> FleetServer {
        FleetServer::new(ServerSettings::default())
    }

    #[tokio::test]
    async fn server_with_default_settings() {
        let server = make_server();
        assert_eq!(server.settings().host, "127.0.0.1");
        assert_eq!(server.settings().port, 0);
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connected_edges"], 0);
    }

    #[tokio::test]
    async fn edges_listing_empty_fleet() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/edges")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["total_count"], 0);
        assert_eq!(parsed["next_page_token"], "");
        assert!(parsed["edges"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edge_status_unknown_is_synthetic_disconnected() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/edges/ghost")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["edge_id"], "ghost");
        assert_eq!(parsed["connection_status"], "disconnected");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn connect_without_upgrade_is_rejected() {
        let server = make_server();
        let app = server.router();

        // A plain GET without upgrade headers cannot become a WebSocket.
        let req = Request::builder()
            .uri("/connect")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn shutdown_propagates_to_coordinator() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn secret_selects_shared_secret_auth() {
        use armada_core::frames::RegisterFrame;

        let server = FleetServer::new(ServerSettings {
            shared_secret: "hunter2".into(),
            ..ServerSettings::default()
        });
        // Registration without the secret is rejected by the manager.
        let err = server
            .manager()
            .register(RegisterFrame {
                edge_id: "edge-1".into(),
                ..RegisterFrame::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            armada_core::errors::FleetError::AuthenticationFailed(_)
        ));
    }
}
