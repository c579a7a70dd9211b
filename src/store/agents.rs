//! Agent registry: credentials and persistent stats

use crate::error::{ArenaError, Result};
use crate::types::{Agent, AgentId};
use crate::utils::{current_timestamp, generate_agent_id, generate_credential};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registration request accepted by the registry
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
}

impl NewAgent {
    /// Build the stored record with a fresh id and credential
    pub fn into_agent(self, initial_rating: f64) -> Result<Agent> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ArenaError::Validation {
                reason: "Agent name is required".to_string(),
            }
            .into());
        }

        Ok(Agent {
            id: generate_agent_id(),
            name,
            description: self.description,
            owner: self.owner,
            credential: generate_credential(),
            wins: 0,
            losses: 0,
            draws: 0,
            elo_rating: initial_rating,
            best_move_count: None,
            claimed: false,
            identity_token: None,
            created_at: current_timestamp(),
        })
    }
}

/// Result of a settled match from one agent's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

/// Stat change applied to one agent during settlement
#[derive(Debug, Clone)]
pub struct StatChange {
    pub agent_id: AgentId,
    pub result: MatchResult,
    /// Replacement rating; `None` leaves the rating untouched
    pub new_rating: Option<f64>,
    /// Move count of a win, checked against the personal best
    pub winning_moves: Option<u32>,
}

impl StatChange {
    fn apply_to(&self, agent: &mut Agent) {
        match self.result {
            MatchResult::Win => agent.wins += 1,
            MatchResult::Loss => agent.losses += 1,
            MatchResult::Draw => agent.draws += 1,
        }
        if let Some(rating) = self.new_rating {
            agent.elo_rating = rating;
        }
        if let Some(moves) = self.winning_moves {
            if agent.best_move_count.map_or(true, |best| moves < best) {
                agent.best_move_count = Some(moves);
            }
        }
    }
}

/// Trait for agent persistence
pub trait AgentStore: Send + Sync {
    /// Store a newly registered agent
    fn insert(&self, agent: Agent) -> Result<Agent>;

    /// Get an agent by ID
    fn get(&self, id: &str) -> Result<Option<Agent>>;

    /// Resolve a bearer credential to its agent
    fn find_by_credential(&self, credential: &str) -> Result<Option<Agent>>;

    /// Apply all changes of one settlement atomically
    fn apply_stat_changes(&self, changes: &[StatChange]) -> Result<Vec<Agent>>;

    /// Record the external identity token once minted
    fn set_identity_token(&self, id: &str, token: &str) -> Result<()>;

    /// Get total number of registered agents
    fn agent_count(&self) -> Result<usize>;
}

/// In-memory agent registry
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for InMemoryAgentStore {
    fn insert(&self, agent: Agent) -> Result<Agent> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| ArenaError::lock_poisoned("agents write"))?;

        if agents.contains_key(&agent.id) {
            return Err(ArenaError::conflict(format!("Agent {} already exists", agent.id)).into());
        }
        agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    fn get(&self, id: &str) -> Result<Option<Agent>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| ArenaError::lock_poisoned("agents read"))?;

        Ok(agents.get(id).cloned())
    }

    fn find_by_credential(&self, credential: &str) -> Result<Option<Agent>> {
        let agents = self
            .agents
            .read()
            .map_err(|_| ArenaError::lock_poisoned("agents read"))?;

        Ok(agents
            .values()
            .find(|agent| agent.credential == credential)
            .cloned())
    }

    fn apply_stat_changes(&self, changes: &[StatChange]) -> Result<Vec<Agent>> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| ArenaError::lock_poisoned("agents write"))?;

        // Validate all first so a missing agent leaves every record untouched
        if let Some(missing) = changes.iter().find(|c| !agents.contains_key(&c.agent_id)) {
            return Err(ArenaError::agent_not_found(&missing.agent_id).into());
        }

        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            if let Some(agent) = agents.get_mut(&change.agent_id) {
                change.apply_to(agent);
                updated.push(agent.clone());
            }
        }

        Ok(updated)
    }

    fn set_identity_token(&self, id: &str, token: &str) -> Result<()> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| ArenaError::lock_poisoned("agents write"))?;

        let agent = agents
            .get_mut(id)
            .ok_or_else(|| ArenaError::agent_not_found(id))?;
        agent.identity_token = Some(token.to_string());
        agent.claimed = true;
        Ok(())
    }

    fn agent_count(&self) -> Result<usize> {
        let agents = self
            .agents
            .read()
            .map_err(|_| ArenaError::lock_poisoned("agents read"))?;

        Ok(agents.len())
    }
}
