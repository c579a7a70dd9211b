//! Common types used throughout the arena service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for agents
pub type AgentId = String;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Lifecycle status of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    WaitingForOpponent,
    ReadyCheck,
    Active,
    Judging,
    Complete,
}

impl MatchStatus {
    /// Statuses that still hold their participants in the match
    pub const NON_TERMINAL: [MatchStatus; 4] = [
        MatchStatus::WaitingForOpponent,
        MatchStatus::ReadyCheck,
        MatchStatus::Active,
        MatchStatus::Judging,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Complete)
    }

    /// Legal edges of the lifecycle. `Active -> Complete` is the timeout exit.
    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        matches!(
            (self, next),
            (MatchStatus::WaitingForOpponent, MatchStatus::ReadyCheck)
                | (MatchStatus::ReadyCheck, MatchStatus::Active)
                | (MatchStatus::Active, MatchStatus::Judging)
                | (MatchStatus::Active, MatchStatus::Complete)
                | (MatchStatus::Judging, MatchStatus::Complete)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::WaitingForOpponent => "waiting_for_opponent",
            MatchStatus::ReadyCheck => "ready_check",
            MatchStatus::Active => "active",
            MatchStatus::Judging => "judging",
            MatchStatus::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting_for_opponent" => Some(MatchStatus::WaitingForOpponent),
            "ready_check" => Some(MatchStatus::ReadyCheck),
            "active" => Some(MatchStatus::Active),
            "judging" => Some(MatchStatus::Judging),
            "complete" => Some(MatchStatus::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant slot within a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(&self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// A reasoning note recorded when an agent moved to a new location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEntry {
    pub thought: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-slot state persisted on the match record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantState {
    pub agent_id: Option<AgentId>,
    pub ready: bool,
    pub move_count: u32,
    pub last_location: Option<String>,
    /// Article titles visited, in order
    pub path: Vec<String>,
    pub reasoning: Vec<ReasoningEntry>,
}

/// Outcome of a decided match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    A,
    B,
    Draw,
}

impl Outcome {
    pub fn winning_slot(&self) -> Option<Slot> {
        match self {
            Outcome::A => Some(Slot::A),
            Outcome::B => Some(Slot::B),
            Outcome::Draw => None,
        }
    }
}

impl From<Slot> for Outcome {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::A => Outcome::A,
            Slot::B => Outcome::B,
        }
    }
}

/// Which part of the oracle produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictTier {
    /// Deterministic path check
    PathCheck,
    /// External judge returned a usable answer
    Judge,
    /// Judge unavailable or unusable; draw by construction
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// Decision recorded on a settled match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub winner: Outcome,
    pub winner_id: Option<AgentId>,
    pub reasoning: String,
    pub tier: VerdictTier,
    pub confidence: Confidence,
}

/// The authoritative match record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub competition_slug: Option<String>,
    pub status: MatchStatus,
    pub task_description: String,
    pub start_location: String,
    pub target: String,
    pub time_limit_seconds: u64,
    pub participant_a: ParticipantState,
    pub participant_b: ParticipantState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verdict: Option<Verdict>,
    pub winner_id: Option<AgentId>,
    /// Bumped by the store on every successful write
    pub version: u64,
}

impl Match {
    pub fn participant(&self, slot: Slot) -> &ParticipantState {
        match slot {
            Slot::A => &self.participant_a,
            Slot::B => &self.participant_b,
        }
    }

    pub fn participant_mut(&mut self, slot: Slot) -> &mut ParticipantState {
        match slot {
            Slot::A => &mut self.participant_a,
            Slot::B => &mut self.participant_b,
        }
    }

    pub fn agent_id(&self, slot: Slot) -> Option<&AgentId> {
        self.participant(slot).agent_id.as_ref()
    }

    pub fn slot_of(&self, agent_id: &str) -> Option<Slot> {
        if self.participant_a.agent_id.as_deref() == Some(agent_id) {
            Some(Slot::A)
        } else if self.participant_b.agent_id.as_deref() == Some(agent_id) {
            Some(Slot::B)
        } else {
            None
        }
    }

    pub fn has_participant(&self, agent_id: &str) -> bool {
        self.slot_of(agent_id).is_some()
    }

    /// True once an active match has passed its end time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Active && self.ends_at.is_some_and(|ends| ends <= now)
    }

    pub fn time_remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.status != MatchStatus::Active {
            return None;
        }
        self.ends_at
            .map(|ends| (ends - now).num_seconds().max(0))
    }
}

/// Registered agent with persistent stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    #[serde(skip_serializing)]
    pub credential: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub elo_rating: f64,
    pub best_move_count: Option<u32>,
    pub claimed: bool,
    pub identity_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn matches_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            agent_id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Compact agent reference used inside events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub name: String,
}

/// One start/target pair in a competition's prompt pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Path such as `/wiki/Science`
    pub start_article: String,
    /// Target article title such as `Physics`
    pub target_article: String,
}

/// Snapshot pushed by an agent during the active window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Base64 encoded image
    pub image: String,
    pub location: String,
    pub move_count: u32,
    pub reasoning: Option<String>,
}

/// Snapshot as held by the telemetry channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub agent_id: AgentId,
    pub image: String,
    pub location: String,
    pub move_count: u32,
    pub reasoning: Option<String>,
    pub timestamp_ms: i64,
}

/// Event emitted when two agents are paired
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPaired {
    pub match_id: MatchId,
    pub agent_a: AgentSummary,
    pub agent_b: AgentSummary,
    pub task_description: String,
    pub start_location: String,
    pub target: String,
    pub time_limit_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when one side has signalled readiness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReady {
    pub match_id: MatchId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when the timed window opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStart {
    pub match_id: MatchId,
    pub agent_a: AgentSummary,
    pub agent_b: AgentSummary,
    pub start_location: String,
    pub target: String,
    pub time_limit_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Live frame fanned out to spectators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEvent {
    pub match_id: MatchId,
    #[serde(flatten)]
    pub frame: Frame,
}

/// Event emitted when a claim moved the match into judging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgingStarted {
    pub match_id: MatchId,
    pub claimed_by: AgentId,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted after settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchComplete {
    pub match_id: MatchId,
    pub result: Outcome,
    pub winner: Option<AgentSummary>,
    pub winner_move_count: Option<u32>,
    pub reasoning: String,
    pub tier: VerdictTier,
    pub time_elapsed_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when an active match ran out of time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTimeout {
    pub match_id: MatchId,
    pub ended_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all channel events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    MatchPaired(MatchPaired),
    AgentReady(AgentReady),
    MatchStart(MatchStart),
    Frame(FrameEvent),
    JudgingStarted(JudgingStarted),
    MatchComplete(MatchComplete),
    MatchTimeout(MatchTimeout),
}

impl ArenaEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            ArenaEvent::MatchPaired(e) => e.match_id,
            ArenaEvent::AgentReady(e) => e.match_id,
            ArenaEvent::MatchStart(e) => e.match_id,
            ArenaEvent::Frame(e) => e.match_id,
            ArenaEvent::JudgingStarted(e) => e.match_id,
            ArenaEvent::MatchComplete(e) => e.match_id,
            ArenaEvent::MatchTimeout(e) => e.match_id,
        }
    }

    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ArenaEvent::MatchPaired(_) => "match_paired",
            ArenaEvent::AgentReady(_) => "agent_ready",
            ArenaEvent::MatchStart(_) => "match_start",
            ArenaEvent::Frame(_) => "frame",
            ArenaEvent::JudgingStarted(_) => "judging_started",
            ArenaEvent::MatchComplete(_) => "match_complete",
            ArenaEvent::MatchTimeout(_) => "match_timeout",
        }
    }
}
