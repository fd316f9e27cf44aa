//! Topod HTTP surface.
//!
//! Two routes: `/status` for build/uptime metadata and `/topology` for the
//! WebSocket topology stream. Watch wiring lives behind the topology
//! handler; this crate only shapes the HTTP edge.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;
use tracing::info;

pub mod error;
pub mod status;
pub mod topology;

pub use error::{ServerError, ServerResult};

/// Build metadata shared by the handlers. Commit and build time are injected
/// at compile time; start time is recorded at construction.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub commit: String,
    pub build_time: String,
    pub start_time: String,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            commit: option_env!("TOPOD_COMMIT").unwrap_or("0").to_string(),
            build_time: option_env!("TOPOD_BUILD_TIME").unwrap_or("0").to_string(),
            start_time: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppServer {
    state: Arc<ServerState>,
}

impl AppServer {
    pub fn new() -> Self {
        Self { state: Arc::new(ServerState::new()) }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Bind and serve until the shutdown future completes.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> ServerResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener =
            TcpListener::bind(addr).await.map_err(|e| ServerError::BindFailed(addr, e))?;
        info!(addr = %addr, "server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        info!("server shut down");
        Ok(())
    }
}

impl Default for AppServer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(status::handle_status))
        .route("/topology", get(topology::topology_upgrade))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds() {
        let _ = AppServer::new().router();
    }

    #[test]
    fn state_records_iso8601_start_time() {
        let state = ServerState::new();
        assert!(chrono::DateTime::parse_from_rfc3339(&state.start_time).is_ok());
    }
}
