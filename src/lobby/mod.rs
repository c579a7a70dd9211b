//! Matchmaking for the arena service
//!
//! This module pairs agents into matches per competition type and holds the
//! readiness barrier that opens the timed window.

pub mod manager;
pub mod provider;
pub mod readiness;

// Re-export commonly used types
pub use manager::{
    CompetitionSummary, MatchHandle, OpenMatchRequest, QueueManager, QueuePlacement,
};
pub use provider::{CompetitionProvider, StaticCompetitionProvider, TaskAssignment};
pub use readiness::{ReadinessBarrier, ReadyReport, ReadyState};
