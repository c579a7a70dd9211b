//! Match registry with guarded writes
//!
//! Every lifecycle transition goes through [`MatchStore::update_where`]: the
//! guard is evaluated against the current record and the update applied in the
//! same critical section, so exactly one of several racing callers can move a
//! match out of a given status. Handlers never hold a lock across an await.

use crate::error::{ArenaError, Result};
use crate::types::{AgentId, Match, MatchId, MatchStatus, ReasoningEntry, Slot, Verdict};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Preconditions a write must satisfy against the stored record
#[derive(Debug, Clone, Default)]
pub struct MatchGuard {
    pub status: Option<MatchStatus>,
    /// Agent must occupy one of the slots
    pub participant: Option<AgentId>,
    /// Slot must still be empty
    pub open_slot: Option<Slot>,
    /// `ends_at` must lie after this instant
    pub before_end: Option<DateTime<Utc>>,
    /// `ends_at` must be at or before this instant
    pub after_end: Option<DateTime<Utc>>,
    /// Slot's last known location must differ from this one
    pub moved_to: Option<(Slot, String)>,
    pub version: Option<u64>,
}

impl MatchGuard {
    pub fn status(status: MatchStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_participant(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.participant = Some(agent_id.into());
        self
    }

    pub fn with_open_slot(mut self, slot: Slot) -> Self {
        self.open_slot = Some(slot);
        self
    }

    pub fn before_end(mut self, now: DateTime<Utc>) -> Self {
        self.before_end = Some(now);
        self
    }

    pub fn after_end(mut self, now: DateTime<Utc>) -> Self {
        self.after_end = Some(now);
        self
    }

    pub fn moved_to(mut self, slot: Slot, location: impl Into<String>) -> Self {
        self.moved_to = Some((slot, location.into()));
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Check the guard against a record
    pub fn holds_for(&self, record: &Match) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(agent_id) = &self.participant {
            if !record.has_participant(agent_id) {
                return false;
            }
        }
        if let Some(slot) = self.open_slot {
            if record.participant(slot).agent_id.is_some() {
                return false;
            }
        }
        if let Some(now) = self.before_end {
            match record.ends_at {
                Some(ends) if ends > now => {}
                _ => return false,
            }
        }
        if let Some(now) = self.after_end {
            match record.ends_at {
                Some(ends) if ends <= now => {}
                _ => return false,
            }
        }
        if let Some((slot, location)) = &self.moved_to {
            if record.participant(*slot).last_location.as_deref() == Some(location.as_str()) {
                return false;
            }
        }
        if let Some(version) = self.version {
            if record.version != version {
                return false;
            }
        }
        true
    }
}

/// Progress reported through the telemetry endpoint
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub location: String,
    pub move_count: u32,
    /// Article title appended to the visited path
    pub visited: Option<String>,
    pub reasoning: Option<ReasoningEntry>,
}

/// Field changes applied by a guarded write
#[derive(Debug, Clone, Default)]
pub struct MatchUpdate {
    pub status: Option<MatchStatus>,
    pub assign: Option<(Slot, AgentId)>,
    pub ready: Option<Slot>,
    pub reset_ready: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Option<(Slot, ProgressUpdate)>,
    /// Also sets the winner reference
    pub verdict: Option<Verdict>,
}

impl MatchUpdate {
    pub fn status(status: MatchStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Whether the update can be applied without breaking record invariants
    fn is_consistent_with(&self, record: &Match) -> bool {
        if let Some(next) = self.status {
            if !record.status.can_transition_to(next) {
                return false;
            }
        }
        if let Some((slot, agent_id)) = &self.assign {
            // Slots are write-once and an agent cannot face itself
            if record.participant(*slot).agent_id.is_some()
                || record.agent_id(slot.other()) == Some(agent_id)
            {
                return false;
            }
        }
        if let Some(slot) = self.ready {
            if record.participant(slot).agent_id.is_none() {
                return false;
            }
        }
        true
    }

    fn apply_to(&self, record: &mut Match) {
        if let Some((slot, agent_id)) = &self.assign {
            record.participant_mut(*slot).agent_id = Some(agent_id.clone());
        }
        if self.reset_ready {
            record.participant_a.ready = false;
            record.participant_b.ready = false;
        }
        if let Some(slot) = self.ready {
            record.participant_mut(slot).ready = true;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(started_at) = self.started_at {
            record.started_at = Some(started_at);
        }
        if let Some(ends_at) = self.ends_at {
            record.ends_at = Some(ends_at);
        }
        if let Some(completed_at) = self.completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some((slot, progress)) = &self.progress {
            let participant = record.participant_mut(*slot);
            participant.last_location = Some(progress.location.clone());
            participant.move_count = progress.move_count;
            if let Some(title) = &progress.visited {
                if participant.path.last() != Some(title) {
                    participant.path.push(title.clone());
                }
            }
            if let Some(entry) = &progress.reasoning {
                participant.reasoning.push(entry.clone());
            }
        }
        if let Some(verdict) = &self.verdict {
            record.winner_id = verdict.winner_id.clone();
            record.verdict = Some(verdict.clone());
        }
        record.version += 1;
    }
}

/// Result of a guarded write
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The guard held; carries the record after the write
    Applied(Match),
    /// The guard failed; carries the record as it currently stands
    Rejected(Match),
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }

    pub fn into_record(self) -> Match {
        match self {
            WriteOutcome::Applied(record) | WriteOutcome::Rejected(record) => record,
        }
    }
}

/// Trait for match persistence
pub trait MatchStore: Send + Sync {
    /// Store a freshly created match
    fn insert(&self, record: Match) -> Result<Match>;

    /// Get a match by ID
    fn get(&self, id: MatchId) -> Result<Option<Match>>;

    /// Apply `update` only if `guard` holds against the current record
    fn update_where(
        &self,
        id: MatchId,
        guard: &MatchGuard,
        update: &MatchUpdate,
    ) -> Result<WriteOutcome>;

    /// Oldest waiting match of a competition with an open second slot that
    /// the given agent does not already occupy
    fn find_open_match(&self, competition_slug: &str, agent_id: &str) -> Result<Option<Match>>;

    /// Any non-terminal match the agent takes part in
    fn find_non_terminal_for_agent(&self, agent_id: &str) -> Result<Option<Match>>;

    /// Matches in the given statuses, newest first
    fn list(&self, statuses: &[MatchStatus], limit: usize) -> Result<Vec<Match>>;

    /// Active matches whose window closed at or before `now`
    fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<MatchId>>;

    /// Judging matches whose window closed at or before `cutoff`
    fn find_stale_judging(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchId>>;

    /// Number of matches in a status, optionally restricted to a competition
    fn count_by_status(&self, status: MatchStatus, competition_slug: Option<&str>)
        -> Result<usize>;

    /// Completed matches an agent took part in, newest first
    fn completed_for_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<Match>>;
}

#[derive(Debug, Default)]
struct MatchTable {
    records: HashMap<MatchId, Match>,
    /// Insertion order, used to break created_at ties
    order: Vec<MatchId>,
}

impl MatchTable {
    fn ordered(&self) -> impl DoubleEndedIterator<Item = &Match> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

/// In-memory match store; non-durable, process scoped
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    table: RwLock<MatchTable>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert(&self, record: Match) -> Result<Match> {
        let mut table = self
            .table
            .write()
            .map_err(|_| ArenaError::lock_poisoned("matches write"))?;

        if table.records.contains_key(&record.id) {
            return Err(ArenaError::conflict(format!("Match {} already exists", record.id)).into());
        }

        table.order.push(record.id);
        table.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: MatchId) -> Result<Option<Match>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        Ok(table.records.get(&id).cloned())
    }

    fn update_where(
        &self,
        id: MatchId,
        guard: &MatchGuard,
        update: &MatchUpdate,
    ) -> Result<WriteOutcome> {
        let mut table = self
            .table
            .write()
            .map_err(|_| ArenaError::lock_poisoned("matches write"))?;

        let record = table
            .records
            .get_mut(&id)
            .ok_or_else(|| ArenaError::match_not_found(id))?;

        if !guard.holds_for(record) || !update.is_consistent_with(record) {
            return Ok(WriteOutcome::Rejected(record.clone()));
        }

        update.apply_to(record);
        Ok(WriteOutcome::Applied(record.clone()))
    }

    fn find_open_match(&self, competition_slug: &str, agent_id: &str) -> Result<Option<Match>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let candidate = table
            .ordered()
            .filter(|m| {
                m.status == MatchStatus::WaitingForOpponent
                    && m.competition_slug.as_deref() == Some(competition_slug)
                    && m.participant_b.agent_id.is_none()
                    && m.participant_a.agent_id.as_deref() != Some(agent_id)
            })
            .min_by_key(|m| m.created_at)
            .cloned();

        Ok(candidate)
    }

    fn find_non_terminal_for_agent(&self, agent_id: &str) -> Result<Option<Match>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let found = table
            .ordered()
            .find(|m| !m.status.is_terminal() && m.has_participant(agent_id))
            .cloned();

        Ok(found)
    }

    fn list(&self, statuses: &[MatchStatus], limit: usize) -> Result<Vec<Match>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let listed = table
            .ordered()
            .rev()
            .filter(|m| statuses.contains(&m.status))
            .take(limit)
            .cloned()
            .collect();

        Ok(listed)
    }

    fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<MatchId>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let expired = table
            .ordered()
            .filter(|m| m.is_expired_at(now))
            .map(|m| m.id)
            .collect();

        Ok(expired)
    }

    fn find_stale_judging(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchId>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let stale = table
            .ordered()
            .filter(|m| m.status == MatchStatus::Judging)
            .filter(|m| m.ends_at.is_some_and(|ends| ends <= cutoff))
            .map(|m| m.id)
            .collect();

        Ok(stale)
    }

    fn count_by_status(
        &self,
        status: MatchStatus,
        competition_slug: Option<&str>,
    ) -> Result<usize> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        Ok(table
            .records
            .values()
            .filter(|m| m.status == status)
            .filter(|m| competition_slug.is_none() || m.competition_slug.as_deref() == competition_slug)
            .count())
    }

    fn completed_for_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<Match>> {
        let table = self
            .table
            .read()
            .map_err(|_| ArenaError::lock_poisoned("matches read"))?;

        let mut completed: Vec<Match> = table
            .records
            .values()
            .filter(|m| m.status == MatchStatus::Complete && m.has_participant(agent_id))
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        completed.truncate(limit);

        Ok(completed)
    }
}
