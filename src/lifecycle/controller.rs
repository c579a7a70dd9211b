//! Match lifecycle after pairing: telemetry, claims, timeouts and reads
//!
//! Every transition out of `active` is a guarded write. Exactly one caller
//! moves a match to `judging` (claim) or straight to `complete` (timeout);
//! everyone else re-reads and gets a report of what already happened.
//! Timeouts are lazy: an expired match is converted the next time anything
//! reads or touches it, and list reads sweep all expired matches first. A
//! match left in `judging` past its window plus a grace period (a claimant
//! that died mid-verdict) is closed unrated the same way.

use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::lifecycle::view::{FrameSummaries, FrameSummary, MatchListing, MatchView};
use crate::metrics::MetricsCollector;
use crate::oracle::{SideEvidence, VerdictEngine, VerdictInput};
use crate::rating::{Settlement, SettlementOutcome};
use crate::store::{AgentStore, MatchGuard, MatchStore, MatchUpdate, ProgressUpdate, WriteOutcome};
use crate::telemetry::FrameStore;
use crate::types::{
    ArenaEvent, Frame, JudgingStarted, Match, MatchId, MatchStatus, MatchTimeout, ReasoningEntry,
    Slot, Snapshot, Verdict,
};
use crate::utils::{current_timestamp, extract_article_title};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a claim-victory call led to
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This call won the claim; the match is settled
    Judged { verdict: Verdict, record: Match },
    /// Another claim is being judged
    AlreadyJudging(Match),
    /// The match was already settled
    AlreadyComplete(Match),
    /// The timed window closed before the claim
    TimedOut(Match),
}

impl ClaimOutcome {
    /// Wire name of the outcome
    pub fn result(&self) -> &'static str {
        match self {
            ClaimOutcome::Judged { .. } => "judged",
            ClaimOutcome::AlreadyJudging(_) => "already_judging",
            ClaimOutcome::AlreadyComplete(_) => "complete",
            ClaimOutcome::TimedOut(_) => "timeout",
        }
    }

    pub fn record(&self) -> &Match {
        match self {
            ClaimOutcome::Judged { record, .. }
            | ClaimOutcome::AlreadyJudging(record)
            | ClaimOutcome::AlreadyComplete(record)
            | ClaimOutcome::TimedOut(record) => record,
        }
    }
}

pub struct MatchLifecycle {
    matches: Arc<dyn MatchStore>,
    agents: Arc<dyn AgentStore>,
    frames: Arc<FrameStore>,
    publisher: Arc<dyn EventPublisher>,
    engine: Arc<VerdictEngine>,
    settlement: Arc<Settlement>,
    metrics: Arc<MetricsCollector>,
    list_limit: usize,
    judging_grace: ChronoDuration,
}

/// Default time a match may stay in `judging` after its window closed
pub const DEFAULT_JUDGING_GRACE_SECONDS: i64 = 300;

impl MatchLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matches: Arc<dyn MatchStore>,
        agents: Arc<dyn AgentStore>,
        frames: Arc<FrameStore>,
        publisher: Arc<dyn EventPublisher>,
        engine: Arc<VerdictEngine>,
        settlement: Arc<Settlement>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            agents,
            frames,
            publisher,
            engine,
            settlement,
            metrics,
            list_limit: 50,
            judging_grace: ChronoDuration::seconds(DEFAULT_JUDGING_GRACE_SECONDS),
        }
    }

    pub fn with_list_limit(mut self, limit: usize) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    pub fn with_judging_grace(mut self, grace: ChronoDuration) -> Self {
        self.judging_grace = grace;
        self
    }

    fn judging_is_stale(&self, record: &Match, now: DateTime<Utc>) -> bool {
        record.status == MatchStatus::Judging
            && record
                .ends_at
                .is_some_and(|ends| ends + self.judging_grace <= now)
    }

    /// Close a match stuck in `judging` past the grace period; returns the current record
    async fn recover_if_stale(&self, record: Match) -> Result<Match> {
        if !self.judging_is_stale(&record, current_timestamp()) {
            return Ok(record);
        }

        warn!("Match {} stuck in judging; closing it unrated", record.id);
        let reasoning = "Judging did not finish in time; no rating changes applied.".to_string();
        Ok(match self.settlement.close_unrated(&record, reasoning).await? {
            SettlementOutcome::Settled(report) => report.record,
            SettlementOutcome::AlreadySettled(current) => current,
        })
    }

    fn load(&self, match_id: MatchId) -> Result<Match> {
        self.matches
            .get(match_id)?
            .ok_or_else(|| ArenaError::match_not_found(match_id).into())
    }

    /// Convert an expired active match to `complete`; returns the current record
    pub async fn expire_if_due(&self, record: Match) -> Result<Match> {
        let now = current_timestamp();
        if !record.is_expired_at(now) {
            return Ok(record);
        }

        let outcome = self.matches.update_where(
            record.id,
            &MatchGuard::status(MatchStatus::Active).after_end(now),
            &MatchUpdate {
                status: Some(MatchStatus::Complete),
                completed_at: Some(now),
                ..Default::default()
            },
        )?;

        match outcome {
            WriteOutcome::Applied(expired) => {
                info!("Match {} timed out without a claim", expired.id);

                if let Err(e) = self.frames.clear_match_frames(expired.id) {
                    warn!("Failed to clear frames for match {}: {}", expired.id, e);
                }
                let event = ArenaEvent::MatchTimeout(MatchTimeout {
                    match_id: expired.id,
                    ended_at: expired.ends_at.unwrap_or(now),
                    timestamp: now,
                });
                if let Err(e) = self.publisher.publish(event).await {
                    warn!("Failed to publish match_timeout for {}: {}", expired.id, e);
                }
                if let Err(e) = self.publisher.close_match(expired.id).await {
                    warn!("Failed to close channel for {}: {}", expired.id, e);
                }
                self.metrics.record_match_completed("timeout");
                Ok(expired)
            }
            WriteOutcome::Rejected(current) => {
                self.metrics.record_race_lost("timeout");
                debug!(
                    "Match {} left active before timeout conversion (now {})",
                    current.id, current.status
                );
                Ok(current)
            }
        }
    }

    /// Expire every active match past its end time and close stale judging;
    /// returns how many matches were converted
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = current_timestamp();
        let expired = self.matches.find_expired(now)?;
        let stale = self.matches.find_stale_judging(now - self.judging_grace)?;
        let mut converted = 0;

        for match_id in expired {
            if let Some(record) = self.matches.get(match_id)? {
                let after = self.expire_if_due(record).await?;
                if after.status == MatchStatus::Complete && after.verdict.is_none() {
                    converted += 1;
                }
            }
        }

        for match_id in stale {
            if let Some(record) = self.matches.get(match_id)? {
                let after = self.recover_if_stale(record).await?;
                if after.status == MatchStatus::Complete {
                    converted += 1;
                }
            }
        }

        if converted > 0 {
            debug!("Sweep converted {} matches", converted);
        }
        Ok(converted)
    }

    /// Accept a snapshot from a participant during the timed window
    pub async fn push_frame(
        &self,
        match_id: MatchId,
        agent_id: &str,
        snapshot: Snapshot,
    ) -> Result<Frame> {
        let timer = self.metrics.start_timer();

        if snapshot.image.is_empty() || snapshot.location.trim().is_empty() {
            return Err(ArenaError::Validation {
                reason: "frame and current_url required".to_string(),
            }
            .into());
        }

        let record = self.load(match_id)?;
        let slot = record.slot_of(agent_id).ok_or_else(|| ArenaError::Forbidden {
            reason: "You are not in this match".to_string(),
        })?;

        if record.status != MatchStatus::Active {
            return Err(ArenaError::Validation {
                reason: "Match is not active".to_string(),
            }
            .into());
        }
        if record.is_expired_at(current_timestamp()) {
            self.expire_if_due(record).await?;
            return Err(ArenaError::Timeout {
                match_id: match_id.to_string(),
            }
            .into());
        }

        let location = snapshot.location.clone();
        let move_count = snapshot.move_count;
        let thought = snapshot
            .reasoning
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let frame = self.frames.store_frame(match_id, agent_id, snapshot).await?;

        let location_changed =
            self.persist_progress(&record, slot, agent_id, location, move_count, thought)?;

        self.metrics.record_frame(location_changed, timer.elapsed());
        Ok(frame)
    }

    /// Record a navigation on the match; returns false when the slot already
    /// stood at `location` or the match left active
    fn persist_progress(
        &self,
        record: &Match,
        slot: Slot,
        agent_id: &str,
        location: String,
        move_count: u32,
        thought: Option<String>,
    ) -> Result<bool> {
        let title = extract_article_title(&location);
        let reasoning = thought.map(|thought| ReasoningEntry {
            thought,
            location: title.clone().unwrap_or_else(|| "Unknown".to_string()),
            timestamp: current_timestamp(),
        });

        let outcome = self.matches.update_where(
            record.id,
            &MatchGuard::status(MatchStatus::Active)
                .with_participant(agent_id)
                .before_end(current_timestamp())
                .moved_to(slot, location.as_str()),
            &MatchUpdate {
                progress: Some((
                    slot,
                    ProgressUpdate {
                        location,
                        move_count,
                        visited: title,
                        reasoning,
                    },
                )),
                ..Default::default()
            },
        )?;

        if !outcome.is_applied() {
            debug!(
                "Progress for match {} not persisted; same location or match left active",
                record.id
            );
        }
        Ok(outcome.is_applied())
    }

    /// Gather what the oracle needs about one side from the record and frame history
    fn evidence(&self, record: &Match, slot: Slot) -> Result<SideEvidence> {
        let state = record.participant(slot);
        let Some(agent_id) = state.agent_id.clone() else {
            return Ok(SideEvidence::default());
        };

        let name = self
            .agents
            .get(&agent_id)?
            .map(|a| a.name)
            .unwrap_or_else(|| agent_id.clone());
        let history = self.frames.get_frame_history(record.id, &agent_id)?;
        let latest = history.last();

        let mut path = state.path.clone();
        if path.is_empty() {
            for frame in &history {
                if path.last() != Some(&frame.location) {
                    path.push(frame.location.clone());
                }
            }
        }

        Ok(SideEvidence {
            last_location: latest
                .map(|f| f.location.clone())
                .or_else(|| state.last_location.clone()),
            move_count: latest.map_or(state.move_count, |f| f.move_count.max(state.move_count)),
            latest_image: latest.map(|f| f.image.clone()),
            agent_id: Some(agent_id),
            name,
            path,
        })
    }

    fn verdict_input(&self, record: &Match) -> Result<VerdictInput> {
        Ok(VerdictInput {
            task_description: record.task_description.clone(),
            target: record.target.clone(),
            side_a: self.evidence(record, Slot::A)?,
            side_b: self.evidence(record, Slot::B)?,
        })
    }

    /// Classify a record for a caller that did not win the claim
    async fn report_for(&self, record: Match) -> Result<ClaimOutcome> {
        let record = self.expire_if_due(record).await?;
        let record = self.recover_if_stale(record).await?;
        Ok(match record.status {
            MatchStatus::Judging => ClaimOutcome::AlreadyJudging(record),
            MatchStatus::Complete if record.verdict.is_some() => {
                ClaimOutcome::AlreadyComplete(record)
            }
            MatchStatus::Complete => ClaimOutcome::TimedOut(record),
            status => {
                return Err(ArenaError::Validation {
                    reason: format!("Match is not active (status: {})", status),
                }
                .into())
            }
        })
    }

    /// Claim victory: close the match, run the oracle and settle
    pub async fn claim_victory(&self, match_id: MatchId, agent_id: &str) -> Result<ClaimOutcome> {
        let record = self.load(match_id)?;
        if !record.has_participant(agent_id) {
            return Err(ArenaError::Forbidden {
                reason: "You are not in this match".to_string(),
            }
            .into());
        }

        let now = current_timestamp();
        if record.status != MatchStatus::Active || record.is_expired_at(now) {
            return self.report_for(record).await;
        }

        let outcome = self.matches.update_where(
            match_id,
            &MatchGuard::status(MatchStatus::Active)
                .with_participant(agent_id)
                .before_end(now),
            &MatchUpdate::status(MatchStatus::Judging),
        )?;

        let judging = match outcome {
            WriteOutcome::Applied(judging) => judging,
            WriteOutcome::Rejected(current) => {
                self.metrics.record_race_lost("claim");
                debug!("Lost claim race for match {} ({})", match_id, agent_id);
                return self.report_for(current).await;
            }
        };

        info!("Agent '{}' claimed victory in match {}; judging", agent_id, match_id);
        let event = ArenaEvent::JudgingStarted(JudgingStarted {
            match_id,
            claimed_by: agent_id.to_string(),
            timestamp: current_timestamp(),
        });
        if let Err(e) = self.publisher.publish(event).await {
            warn!("Failed to publish judging_started for {}: {}", match_id, e);
        }

        // From here on the match must leave `judging` whatever fails
        let settled = match self.verdict_input(&judging) {
            Ok(input) => {
                let verdict = self.engine.decide(&input).await;
                let timer = self.metrics.start_timer();
                let settled = self.settlement.settle(&judging, verdict).await;
                self.metrics.record_settlement(timer.elapsed());
                settled
            }
            Err(e) => {
                error!("Could not gather evidence for match {}: {:#}", match_id, e);
                self.settlement
                    .close_unrated(
                        &judging,
                        "Race evidence was unavailable; no rating changes applied.".to_string(),
                    )
                    .await
            }
        };

        match settled {
            Ok(SettlementOutcome::Settled(report)) => Ok(ClaimOutcome::Judged {
                verdict: report.verdict,
                record: report.record,
            }),
            Ok(SettlementOutcome::AlreadySettled(current)) => {
                Ok(ClaimOutcome::AlreadyComplete(current))
            }
            Err(e) => {
                error!("Settlement failed for match {}: {:#}", match_id, e);
                Err(e)
            }
        }
    }

    /// Full match read, applying lazy expiry first
    pub async fn match_view(&self, match_id: MatchId) -> Result<MatchView> {
        let record = self.expire_if_due(self.load(match_id)?).await?;
        let record = self.recover_if_stale(record).await?;

        let frames = if record.status == MatchStatus::Active {
            let latest = self.frames.get_frames_for_match(
                record.id,
                record.participant_a.agent_id.as_deref(),
                record.participant_b.agent_id.as_deref(),
            )?;
            Some(FrameSummaries {
                agent_a: latest.agent_a.as_ref().map(FrameSummary::from),
                agent_b: latest.agent_b.as_ref().map(FrameSummary::from),
            })
        } else {
            None
        };

        Ok(MatchView::build(
            &record,
            current_timestamp(),
            |id| self.agents.get(id).ok().flatten(),
            frames,
        ))
    }

    /// Most recent matches, optionally filtered by status
    pub async fn list_matches(&self, status: Option<MatchStatus>) -> Result<Vec<MatchListing>> {
        self.sweep_expired().await?;

        let statuses: Vec<MatchStatus> = match status {
            Some(status) => vec![status],
            None => MatchStatus::NON_TERMINAL
                .iter()
                .copied()
                .chain(std::iter::once(MatchStatus::Complete))
                .collect(),
        };

        Ok(self
            .matches
            .list(&statuses, self.list_limit)?
            .iter()
            .map(MatchListing::from)
            .collect())
    }

    /// Recording of one participant's snapshots, oldest first
    pub fn frame_history(&self, match_id: MatchId, agent_id: &str) -> Result<Vec<Frame>> {
        let record = self.load(match_id)?;
        if !record.has_participant(agent_id) {
            return Err(ArenaError::agent_not_found(agent_id).into());
        }
        self.frames.get_frame_history(match_id, agent_id)
    }
}
