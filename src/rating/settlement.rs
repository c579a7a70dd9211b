//! Settlement: applies a verdict to the match record and agent stats
//!
//! Settlement runs at most once per match. The `judging -> complete` write is
//! guarded, so a second caller holding the same verdict gets
//! [`SettlementOutcome::AlreadySettled`] and touches nothing. A match that
//! cannot be rated still leaves `judging`: it is closed as an unrated draw.

use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::metrics::MetricsCollector;
use crate::rating::elo::{RatingCalculator, RatingUpdate};
use crate::rating::sync::{spawn_stat_sync, IdentitySync, StatSync};
use crate::store::{
    AgentStore, MatchGuard, MatchResult, MatchStore, MatchUpdate, StatChange, WriteOutcome,
};
use crate::telemetry::FrameStore;
use crate::types::{
    Agent, ArenaEvent, Confidence, Match, MatchComplete, MatchStatus, Outcome, Slot, Verdict,
    VerdictTier,
};
use crate::utils::current_timestamp;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What settlement did
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled(SettlementReport),
    /// Another caller completed the match first
    AlreadySettled(Match),
}

#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub record: Match,
    pub verdict: Verdict,
    pub rating_update: Option<RatingUpdate>,
    pub agents: Vec<Agent>,
}

pub struct Settlement {
    matches: Arc<dyn MatchStore>,
    agents: Arc<dyn AgentStore>,
    frames: Arc<FrameStore>,
    publisher: Arc<dyn EventPublisher>,
    calculator: Arc<dyn RatingCalculator>,
    identity: Arc<dyn IdentitySync>,
    metrics: Arc<MetricsCollector>,
}

impl Settlement {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        agents: Arc<dyn AgentStore>,
        frames: Arc<FrameStore>,
        publisher: Arc<dyn EventPublisher>,
        calculator: Arc<dyn RatingCalculator>,
        identity: Arc<dyn IdentitySync>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            agents,
            frames,
            publisher,
            calculator,
            identity,
            metrics,
        }
    }

    fn participant(&self, record: &Match, agent_id: Option<&String>) -> Result<Agent> {
        let agent_id = agent_id.ok_or_else(|| ArenaError::Internal {
            message: format!("Match {} is missing a participant", record.id),
        })?;
        self.agents
            .get(agent_id)?
            .ok_or_else(|| ArenaError::agent_not_found(agent_id).into())
    }

    /// Work out every stat change before committing the match
    fn plan(
        &self,
        record: &Match,
        verdict: &Verdict,
    ) -> Result<(Vec<StatChange>, Option<RatingUpdate>)> {
        let agent_a = self.participant(record, record.participant_a.agent_id.as_ref())?;
        let agent_b = self.participant(record, record.participant_b.agent_id.as_ref())?;

        let Some(winning_slot) = verdict.winner.winning_slot() else {
            // Draws leave ratings where they are
            let changes = [agent_a, agent_b]
                .into_iter()
                .map(|agent| StatChange {
                    agent_id: agent.id,
                    result: MatchResult::Draw,
                    new_rating: None,
                    winning_moves: None,
                })
                .collect();
            return Ok((changes, None));
        };

        let (winner, loser) = match winning_slot {
            Slot::A => (agent_a, agent_b),
            Slot::B => (agent_b, agent_a),
        };
        let update = self
            .calculator
            .rate_decisive(winner.elo_rating, loser.elo_rating)?;

        let changes = vec![
            StatChange {
                agent_id: winner.id,
                result: MatchResult::Win,
                new_rating: Some(update.winner_new),
                winning_moves: Some(record.participant(winning_slot).move_count),
            },
            StatChange {
                agent_id: loser.id,
                result: MatchResult::Loss,
                new_rating: Some(update.loser_new),
                winning_moves: None,
            },
        ];
        Ok((changes, Some(update)))
    }

    /// Guarded `judging -> complete` write carrying the verdict
    fn complete(&self, record: &Match, verdict: &Verdict) -> Result<WriteOutcome> {
        let outcome = self.matches.update_where(
            record.id,
            &MatchGuard::status(MatchStatus::Judging),
            &MatchUpdate {
                status: Some(MatchStatus::Complete),
                completed_at: Some(current_timestamp()),
                verdict: Some(verdict.clone()),
                ..Default::default()
            },
        )?;

        if let WriteOutcome::Rejected(current) = &outcome {
            self.metrics.record_race_lost("settle");
            debug!(
                "Match {} already left judging (now {}), skipping settlement",
                record.id, current.status
            );
        }
        Ok(outcome)
    }

    /// Settle a match currently in `judging`
    pub async fn settle(&self, record: &Match, verdict: Verdict) -> Result<SettlementOutcome> {
        let (changes, rating_update) = match self.plan(record, &verdict) {
            Ok(planned) => planned,
            Err(e) => {
                warn!("Cannot rate match {}: {:#}", record.id, e);
                return self
                    .close_unrated(record, format!("Match could not be rated: {}", e))
                    .await;
            }
        };

        let settled = match self.complete(record, &verdict)? {
            WriteOutcome::Applied(settled) => settled,
            WriteOutcome::Rejected(current) => {
                return Ok(SettlementOutcome::AlreadySettled(current));
            }
        };

        // The match is complete either way; a failed stat write is not retried
        let agents = match self.agents.apply_stat_changes(&changes) {
            Ok(agents) => agents,
            Err(e) => {
                error!("Failed to apply stats for match {}: {:#}", settled.id, e);
                Vec::new()
            }
        };
        if let Some(update) = &rating_update {
            info!(
                "Match {} settled: winner {} ({:.1} -> {:.1}), loser ({:.1} -> {:.1})",
                settled.id,
                verdict.winner_id.as_deref().unwrap_or("none"),
                update.winner_old,
                update.winner_new,
                update.loser_old,
                update.loser_new
            );
        } else {
            info!("Match {} settled as a draw", settled.id);
        }

        if let Err(e) = self.frames.clear_match_frames(settled.id) {
            warn!("Failed to clear frames for match {}: {}", settled.id, e);
        }

        self.publish_complete(&settled, &verdict, &agents).await;

        let updates = agents
            .iter()
            .map(|agent| StatSync::from_agent(agent, settled.id))
            .collect();
        // Detached; settlement never waits on the identity service
        drop(spawn_stat_sync(
            self.identity.clone(),
            self.metrics.clone(),
            updates,
        ));

        let result = if verdict.winner == Outcome::Draw {
            "draw"
        } else {
            "decisive"
        };
        self.metrics.record_match_completed(result);

        Ok(SettlementOutcome::Settled(SettlementReport {
            record: settled,
            verdict,
            rating_update,
            agents,
        }))
    }

    /// Close a match in `judging` as a draw without touching agent stats
    pub async fn close_unrated(
        &self,
        record: &Match,
        reasoning: String,
    ) -> Result<SettlementOutcome> {
        let verdict = Verdict {
            winner: Outcome::Draw,
            winner_id: None,
            reasoning,
            tier: VerdictTier::Fallback,
            confidence: Confidence::Medium,
        };

        let settled = match self.complete(record, &verdict)? {
            WriteOutcome::Applied(settled) => settled,
            WriteOutcome::Rejected(current) => {
                return Ok(SettlementOutcome::AlreadySettled(current));
            }
        };
        warn!("Match {} closed without rating changes", settled.id);

        if let Err(e) = self.frames.clear_match_frames(settled.id) {
            warn!("Failed to clear frames for match {}: {}", settled.id, e);
        }
        self.publish_complete(&settled, &verdict, &[]).await;
        self.metrics.record_match_completed("unrated");

        Ok(SettlementOutcome::Settled(SettlementReport {
            record: settled,
            verdict,
            rating_update: None,
            agents: Vec::new(),
        }))
    }

    async fn publish_complete(&self, settled: &Match, verdict: &Verdict, agents: &[Agent]) {
        let winner = verdict
            .winner_id
            .as_deref()
            .and_then(|id| agents.iter().find(|a| a.id == id))
            .map(Agent::summary);
        let winner_move_count = verdict
            .winner
            .winning_slot()
            .map(|slot| settled.participant(slot).move_count);
        let time_elapsed_seconds = settled
            .started_at
            .zip(settled.completed_at)
            .map(|(started, completed)| (completed - started).num_seconds().max(0))
            .unwrap_or(0);

        let event = ArenaEvent::MatchComplete(MatchComplete {
            match_id: settled.id,
            result: verdict.winner,
            winner,
            winner_move_count,
            reasoning: verdict.reasoning.clone(),
            tier: verdict.tier,
            time_elapsed_seconds,
            timestamp: current_timestamp(),
        });

        if let Err(e) = self.publisher.publish(event).await {
            warn!("Failed to publish match_complete for {}: {}", settled.id, e);
        }
        if let Err(e) = self.publisher.close_match(settled.id).await {
            warn!("Failed to close channel for {}: {}", settled.id, e);
        }
    }
}
