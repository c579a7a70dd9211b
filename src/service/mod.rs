//! Service layer for the arena
//!
//! This module contains the application state, the HTTP API with its
//! spectator WebSocket, health checks and the server that hosts them.

pub mod api_error;
pub mod app;
pub mod auth;
pub mod health;
pub mod live;
pub mod routes;
pub mod server;

pub use api_error::ApiError;
pub use app::{AppState, ServiceError};
pub use auth::AuthenticatedAgent;
pub use health::{HealthCheck, HealthStatus};
pub use server::{build_router, ArenaServer, ServerConfig};
