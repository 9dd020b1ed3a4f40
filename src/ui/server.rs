//! Axum HTTP server

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::engine::EngineHandle;
use crate::error::NetworkError;
use crate::network::udp::parse_bind_addr;

/// Application state shared across all requests
pub struct AppState {
    pub engine: EngineHandle,
}

/// API routes with permissive CORS
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route(
            "/api/config",
            get(handlers::get_config)
                .post(handlers::update_config)
                .put(handlers::update_config)
                .patch(handlers::update_config),
        )
        .route("/api/effect/set", post(handlers::set_effect))
        .route("/api/playlist/resume", post(handlers::resume_playlist))
        .route("/api/playlist/add", post(handlers::playlist_add))
        .route("/api/playlist/remove", post(handlers::playlist_remove))
        .route("/api/effects", get(handlers::get_effects))
        .layer(cors)
        .with_state(state)
}

/// HTTP control API
pub struct WebServer {
    addr: SocketAddr,
    engine: EngineHandle,
}

impl WebServer {
    pub fn new(bind_address: &str, port: u16, engine: EngineHandle) -> Result<Self, NetworkError> {
        Ok(Self {
            addr: parse_bind_addr(bind_address, port)?,
            engine,
        })
    }

    /// Bind now, serve in a background task until engine shutdown
    ///
    /// Bind errors are returned here so startup can fail fast.
    pub async fn start_background(self) -> Result<(SocketAddr, JoinHandle<()>), NetworkError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", self.addr, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let shutdown = self.engine.shutdown_signal();
        let app = router(Arc::new(AppState {
            engine: self.engine,
        }));

        tracing::info!("HTTP API listening on http://{}", local);
        let handle = tokio::spawn(async move {
            let stopped = async move {
                let _ = tokio::task::spawn_blocking(move || shutdown.recv()).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
            tracing::info!("HTTP API stopped");
        });
        Ok((local, handle))
    }
}
