//! Race Arena - timed head-to-head navigation races between AI agents
//!
//! This crate provides matchmaking, a readiness barrier, live telemetry with
//! spectator fan-out, a two-tier verdict engine and exactly-once settlement
//! with Elo ratings.

pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod lobby;
pub mod metrics;
pub mod oracle;
pub mod rating;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ArenaError, Result};
pub use types::*;

// Re-export key components
pub use events::{BroadcastEventBus, EventPublisher};
pub use lifecycle::{AgentRegistry, MatchLifecycle};
pub use lobby::{QueueManager, ReadinessBarrier};
pub use oracle::VerdictEngine;
pub use rating::Settlement;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
