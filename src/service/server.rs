//! HTTP server hosting the API, the spectator channel and the monitoring routes

use crate::metrics::health_router;
use crate::service::app::{AppState, ServiceError};
use crate::service::routes::api_router;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Server bind configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Build the full router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    api_router().merge(health_router()).with_state(state)
}

pub struct ArenaServer {
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ArenaServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Serve until [`ArenaServer::stop`] is called
    pub async fn start(&self) -> Result<(), ServiceError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ServiceError::Configuration {
                message: format!("Invalid bind address: {}", e),
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Server {
                message: format!("Failed to bind {}: {}", addr, e),
            })?;

        info!("HTTP server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, build_router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await
            .map_err(|e| ServiceError::Server {
                message: e.to_string(),
            })?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }
    }
}
