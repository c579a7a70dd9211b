//! Readiness barrier between pairing and the timed window

use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::metrics::MetricsCollector;
use crate::store::{AgentStore, MatchGuard, MatchStore, MatchUpdate, WriteOutcome};
use crate::types::{
    AgentReady, AgentSummary, ArenaEvent, Match, MatchId, MatchStart, MatchStatus, Slot,
};
use crate::utils::{current_timestamp, match_deadline};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a ready signal achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Caller's flag is set; the opponent has not signalled yet
    WaitingForOpponent,
    /// This call started the match
    Started,
    /// The match was not in ready_check; nothing changed
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ReadyReport {
    pub state: ReadyState,
    pub record: Match,
}

impl ReadyReport {
    pub fn match_started(&self) -> bool {
        self.record.status == MatchStatus::Active
    }
}

pub struct ReadinessBarrier {
    matches: Arc<dyn MatchStore>,
    agents: Arc<dyn AgentStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
}

impl ReadinessBarrier {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        agents: Arc<dyn AgentStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            agents,
            publisher,
            metrics,
        }
    }

    fn summary_for(&self, record: &Match, slot: Slot) -> AgentSummary {
        let agent_id = record.agent_id(slot).cloned().unwrap_or_default();
        match self.agents.get(&agent_id) {
            Ok(Some(agent)) => agent.summary(),
            _ => AgentSummary {
                name: agent_id.clone(),
                agent_id,
            },
        }
    }

    /// Record that `agent_id` is ready; starts the match once both sides are
    pub async fn signal_ready(&self, match_id: MatchId, agent_id: &str) -> Result<ReadyReport> {
        let record = self
            .matches
            .get(match_id)?
            .ok_or_else(|| ArenaError::match_not_found(match_id))?;

        let slot = record.slot_of(agent_id).ok_or_else(|| ArenaError::Forbidden {
            reason: "You are not in this match".to_string(),
        })?;

        if record.status != MatchStatus::ReadyCheck {
            debug!(
                "Ready signal for match {} in status {}; nothing to do",
                match_id, record.status
            );
            return Ok(ReadyReport {
                state: ReadyState::Unchanged,
                record,
            });
        }

        let flagged = match self.matches.update_where(
            match_id,
            &MatchGuard::status(MatchStatus::ReadyCheck).with_participant(agent_id),
            &MatchUpdate {
                ready: Some(slot),
                ..Default::default()
            },
        )? {
            WriteOutcome::Applied(record) => record,
            WriteOutcome::Rejected(current) => {
                // Someone else moved the match on in between
                return Ok(ReadyReport {
                    state: ReadyState::Unchanged,
                    record: current,
                });
            }
        };

        if !flagged.participant(slot.other()).ready {
            let event = ArenaEvent::AgentReady(AgentReady {
                match_id,
                agent_id: agent_id.to_string(),
                agent_name: self.summary_for(&flagged, slot).name,
                timestamp: current_timestamp(),
            });
            if let Err(e) = self.publisher.publish(event).await {
                warn!("Failed to publish agent_ready for {}: {}", match_id, e);
            }
            info!("Agent '{}' ready in match {}", agent_id, match_id);
            return Ok(ReadyReport {
                state: ReadyState::WaitingForOpponent,
                record: flagged,
            });
        }

        let started_at = current_timestamp();
        let ends_at = match_deadline(started_at, flagged.time_limit_seconds)?;

        let mut update = MatchUpdate::status(MatchStatus::Active);
        update.started_at = Some(started_at);
        update.ends_at = Some(ends_at);

        match self.matches.update_where(
            match_id,
            &MatchGuard::status(MatchStatus::ReadyCheck),
            &update,
        )? {
            WriteOutcome::Applied(active) => {
                let event = ArenaEvent::MatchStart(MatchStart {
                    match_id,
                    agent_a: self.summary_for(&active, Slot::A),
                    agent_b: self.summary_for(&active, Slot::B),
                    start_location: active.start_location.clone(),
                    target: active.target.clone(),
                    time_limit_seconds: active.time_limit_seconds,
                    started_at,
                    ends_at,
                });
                if let Err(e) = self.publisher.publish(event).await {
                    warn!("Failed to publish match_start for {}: {}", match_id, e);
                }
                self.metrics.record_match_started();
                info!(
                    "Match {} started - target: '{}', ends at {}",
                    match_id, active.target, ends_at
                );
                Ok(ReadyReport {
                    state: ReadyState::Started,
                    record: active,
                })
            }
            WriteOutcome::Rejected(current) => {
                self.metrics.record_race_lost("start");
                debug!("Lost start race for match {}", match_id);
                Ok(ReadyReport {
                    state: ReadyState::Unchanged,
                    record: current,
                })
            }
        }
    }
}
