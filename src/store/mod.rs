//! Persistent registries for matches and agents
//!
//! Both stores are trait objects so the lifecycle code only depends on the
//! guarded-write contract; the in-memory implementations are process scoped.

pub mod agents;
pub mod matches;

pub use agents::{AgentStore, InMemoryAgentStore, MatchResult, NewAgent, StatChange};
pub use matches::{
    InMemoryMatchStore, MatchGuard, MatchStore, MatchUpdate, ProgressUpdate, WriteOutcome,
};
