//! Read models returned to agents and spectators

use crate::types::{
    Agent, AgentId, AgentSummary, Frame, Match, MatchId, MatchStatus, ReasoningEntry, Slot,
    Verdict,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One participant as seen from outside
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub agent_id: AgentId,
    pub name: String,
    pub ready: bool,
    pub move_count: u32,
    pub path: Vec<String>,
    pub current_location: Option<String>,
    pub reasoning: Vec<ReasoningEntry>,
}

/// Latest snapshot without the image payload
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub location: String,
    pub move_count: u32,
    pub reasoning: Option<String>,
    pub timestamp_ms: i64,
}

impl From<&Frame> for FrameSummary {
    fn from(frame: &Frame) -> Self {
        Self {
            location: frame.location.clone(),
            move_count: frame.move_count,
            reasoning: frame.reasoning.clone(),
            timestamp_ms: frame.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameSummaries {
    pub agent_a: Option<FrameSummary>,
    pub agent_b: Option<FrameSummary>,
}

/// Full match read
#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub competition: Option<String>,
    pub task_description: String,
    pub start_location: String,
    pub target: String,
    pub time_limit_seconds: u64,
    pub time_remaining_seconds: Option<i64>,
    pub agent_a: Option<ParticipantView>,
    pub agent_b: Option<ParticipantView>,
    pub winner: Option<AgentSummary>,
    pub verdict: Option<Verdict>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Only present while the match is active
    pub frames: Option<FrameSummaries>,
}

impl MatchView {
    /// Build the view; `lookup` resolves agent names
    pub fn build(
        record: &Match,
        now: DateTime<Utc>,
        lookup: impl Fn(&str) -> Option<Agent>,
        frames: Option<FrameSummaries>,
    ) -> Self {
        let participant = |slot: Slot| {
            let state = record.participant(slot);
            state.agent_id.as_ref().map(|id| ParticipantView {
                agent_id: id.clone(),
                name: lookup(id).map(|a| a.name).unwrap_or_else(|| id.clone()),
                ready: state.ready,
                move_count: state.move_count,
                path: state.path.clone(),
                current_location: state.last_location.clone(),
                reasoning: state.reasoning.clone(),
            })
        };

        let winner = record.winner_id.as_ref().map(|id| AgentSummary {
            agent_id: id.clone(),
            name: lookup(id).map(|a| a.name).unwrap_or_else(|| id.clone()),
        });

        Self {
            match_id: record.id,
            status: record.status,
            competition: record.competition_slug.clone(),
            task_description: record.task_description.clone(),
            start_location: record.start_location.clone(),
            target: record.target.clone(),
            time_limit_seconds: record.time_limit_seconds,
            time_remaining_seconds: record.time_remaining_seconds(now),
            agent_a: participant(Slot::A),
            agent_b: participant(Slot::B),
            winner,
            verdict: record.verdict.clone(),
            created_at: record.created_at,
            started_at: record.started_at,
            ends_at: record.ends_at,
            completed_at: record.completed_at,
            frames,
        }
    }
}

/// Compact row for match listings
#[derive(Debug, Clone, Serialize)]
pub struct MatchListing {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub competition: Option<String>,
    pub target: String,
    pub agent_a: Option<AgentId>,
    pub agent_b: Option<AgentId>,
    pub winner_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl From<&Match> for MatchListing {
    fn from(record: &Match) -> Self {
        Self {
            match_id: record.id,
            status: record.status,
            competition: record.competition_slug.clone(),
            target: record.target.clone(),
            agent_a: record.participant_a.agent_id.clone(),
            agent_b: record.participant_b.agent_id.clone(),
            winner_id: record.winner_id.clone(),
            created_at: record.created_at,
        }
    }
}

/// Agent profile with recent results
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub matches_played: u32,
    pub elo_rating: f64,
    pub best_move_count: Option<u32>,
    pub claimed: bool,
    pub identity_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub recent_matches: Vec<MatchListing>,
}

impl AgentProfile {
    pub fn new(agent: Agent, recent: &[Match]) -> Self {
        Self {
            matches_played: agent.matches_played(),
            agent_id: agent.id,
            name: agent.name,
            description: agent.description,
            owner: agent.owner,
            wins: agent.wins,
            losses: agent.losses,
            draws: agent.draws,
            elo_rating: agent.elo_rating,
            best_move_count: agent.best_move_count,
            claimed: agent.claimed,
            identity_token: agent.identity_token,
            created_at: agent.created_at,
            recent_matches: recent.iter().map(MatchListing::from).collect(),
        }
    }
}
