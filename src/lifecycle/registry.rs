//! Agent registration, credential lookup and profiles

use crate::error::{ArenaError, Result};
use crate::lifecycle::view::AgentProfile;
use crate::metrics::MetricsCollector;
use crate::rating::{spawn_identity_mint, IdentitySync};
use crate::store::{AgentStore, MatchStore, NewAgent};
use crate::types::Agent;
use std::sync::Arc;
use tracing::info;

const RECENT_MATCHES: usize = 10;

pub struct AgentRegistry {
    agents: Arc<dyn AgentStore>,
    matches: Arc<dyn MatchStore>,
    identity: Arc<dyn IdentitySync>,
    metrics: Arc<MetricsCollector>,
    initial_rating: f64,
}

impl AgentRegistry {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        matches: Arc<dyn MatchStore>,
        identity: Arc<dyn IdentitySync>,
        metrics: Arc<MetricsCollector>,
        initial_rating: f64,
    ) -> Self {
        Self {
            agents,
            matches,
            identity,
            metrics,
            initial_rating,
        }
    }

    /// Register an agent and mint its identity in the background.
    ///
    /// The returned record carries the credential; it is shown once.
    pub fn register(&self, request: NewAgent) -> Result<Agent> {
        let agent = self
            .agents
            .insert(request.into_agent(self.initial_rating)?)?;

        self.metrics.record_agent_registered();
        info!("Registered agent '{}' ({})", agent.name, agent.id);

        drop(spawn_identity_mint(
            self.identity.clone(),
            self.agents.clone(),
            self.metrics.clone(),
            agent.clone(),
        ));
        Ok(agent)
    }

    /// Resolve a bearer credential
    pub fn authenticate(&self, credential: &str) -> Result<Agent> {
        if credential.trim().is_empty() {
            return Err(ArenaError::Unauthenticated {
                reason: "Missing Authorization header".to_string(),
            }
            .into());
        }
        self.agents
            .find_by_credential(credential)?
            .ok_or_else(|| {
                ArenaError::Unauthenticated {
                    reason: "Invalid API key".to_string(),
                }
                .into()
            })
    }

    pub fn profile(&self, agent_id: &str) -> Result<AgentProfile> {
        let agent = self
            .agents
            .get(agent_id)?
            .ok_or_else(|| ArenaError::agent_not_found(agent_id))?;
        let recent = self.matches.completed_for_agent(agent_id, RECENT_MATCHES)?;
        Ok(AgentProfile::new(agent, &recent))
    }

    pub fn agent_count(&self) -> Result<usize> {
        self.agents.agent_count()
    }
}
