//! Queue manager: pairs agents into matches for a competition type
//!
//! This module provides the QueueManager that finds or creates matches for
//! queued agents. Every slot fill is a guarded write against the match store;
//! a lost write re-runs the search a bounded number of times before a fresh
//! match is created.

use crate::config::{time_limit_in_range, MAX_TIME_LIMIT_SECONDS};
use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::lobby::provider::{CompetitionProvider, TaskAssignment};
use crate::metrics::MetricsCollector;
use crate::store::{AgentStore, MatchGuard, MatchStore, MatchUpdate, WriteOutcome};
use crate::types::{
    AgentSummary, ArenaEvent, Match, MatchPaired, MatchStatus, ParticipantState, Prompt,
    Slot,
};
use crate::utils::{current_timestamp, generate_match_id};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// How an enqueue request was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePlacement {
    /// Took the empty first slot of an open match
    JoinedOpenMatch,
    /// Took the second slot; the match moved to ready_check
    Paired,
    /// No candidate; a new match was created with the caller in slot A
    Created,
}

impl QueuePlacement {
    pub fn message(&self) -> &'static str {
        match self {
            QueuePlacement::JoinedOpenMatch => "Joined as agent 1. Waiting for opponent.",
            QueuePlacement::Paired => "Paired with opponent. Signal ready to start the match.",
            QueuePlacement::Created => {
                "Waiting for opponent. Match will start when another agent joins."
            }
        }
    }
}

/// Result of an enqueue request
#[derive(Debug, Clone)]
pub struct MatchHandle {
    pub placement: QueuePlacement,
    pub record: Match,
    /// Set when the caller was paired with someone
    pub opponent: Option<AgentSummary>,
}

/// Request for a participant-less match
#[derive(Debug, Clone, Default)]
pub struct OpenMatchRequest {
    pub competition_slug: String,
    /// Fixed task; drawn from the pool when absent
    pub prompt: Option<Prompt>,
    pub time_limit_seconds: Option<u64>,
}

/// Per-competition listing entry
#[derive(Debug, Clone, Serialize)]
pub struct CompetitionSummary {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub time_limit_seconds: u64,
    pub prompt_count: usize,
    pub waiting_matches: usize,
}

/// The queue manager
#[derive(Clone)]
pub struct QueueManager {
    matches: Arc<dyn MatchStore>,
    agents: Arc<dyn AgentStore>,
    provider: Arc<dyn CompetitionProvider>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    max_pairing_attempts: u32,
    wiki_base_url: String,
}

impl QueueManager {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        agents: Arc<dyn AgentStore>,
        provider: Arc<dyn CompetitionProvider>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            agents,
            provider,
            publisher,
            metrics,
            max_pairing_attempts: 3,
            wiki_base_url: "https://en.wikipedia.org".to_string(),
        }
    }

    /// Override how often a lost pairing race re-runs the search
    pub fn with_max_pairing_attempts(mut self, attempts: u32) -> Self {
        self.max_pairing_attempts = attempts.max(1);
        self
    }

    pub fn with_wiki_base_url(mut self, base: impl Into<String>) -> Self {
        self.wiki_base_url = base.into();
        self
    }

    fn summary_for(&self, agent_id: &str) -> AgentSummary {
        match self.agents.get(agent_id) {
            Ok(Some(agent)) => agent.summary(),
            _ => AgentSummary {
                agent_id: agent_id.to_string(),
                name: agent_id.to_string(),
            },
        }
    }

    /// Place an agent into a match of the given competition type
    pub async fn enqueue(&self, agent_id: &str, competition_slug: &str) -> Result<MatchHandle> {
        let timer = self.metrics.start_timer();

        info!(
            "Processing queue request - agent_id: '{}', competition: '{}'",
            agent_id, competition_slug
        );

        let competition = self.provider.get_competition(competition_slug)?;

        // Check-then-act: two simultaneous enqueues by one agent can both pass here
        if let Some(existing) = self.matches.find_non_terminal_for_agent(agent_id)? {
            return Err(ArenaError::Conflict {
                reason: "Already in a match".to_string(),
                match_id: Some(existing.id.to_string()),
                status: Some(existing.status.to_string()),
            }
            .into());
        }

        for attempt in 1..=self.max_pairing_attempts {
            let Some(candidate) = self.matches.find_open_match(&competition.slug, agent_id)? else {
                break;
            };

            if candidate.participant_a.agent_id.is_none() {
                let outcome = self.matches.update_where(
                    candidate.id,
                    &MatchGuard::status(MatchStatus::WaitingForOpponent).with_open_slot(Slot::A),
                    &MatchUpdate {
                        assign: Some((Slot::A, agent_id.to_string())),
                        ..Default::default()
                    },
                )?;

                if let WriteOutcome::Applied(record) = outcome {
                    info!("Agent '{}' took the first slot of open match {}", agent_id, record.id);
                    self.metrics.record_enqueue(timer.elapsed());
                    return Ok(MatchHandle {
                        placement: QueuePlacement::JoinedOpenMatch,
                        record,
                        opponent: None,
                    });
                }
            } else {
                let outcome = self.matches.update_where(
                    candidate.id,
                    &MatchGuard::status(MatchStatus::WaitingForOpponent).with_open_slot(Slot::B),
                    &MatchUpdate {
                        status: Some(MatchStatus::ReadyCheck),
                        assign: Some((Slot::B, agent_id.to_string())),
                        reset_ready: true,
                        ..Default::default()
                    },
                )?;

                if let WriteOutcome::Applied(record) = outcome {
                    let handle = self.announce_pairing(record, &competition.slug).await;
                    self.metrics.record_enqueue(timer.elapsed());
                    return Ok(handle);
                }
            }

            self.metrics.record_race_lost("enqueue");
            debug!(
                "Lost pairing race for match {} (attempt {}/{}), searching again",
                candidate.id, attempt, self.max_pairing_attempts
            );
        }

        let task = self.provider.draw_task(&competition)?;
        let record = self
            .matches
            .insert(Self::build_match(&competition.slug, task, Some(agent_id)))?;

        self.metrics.record_match_created(&competition.slug);
        self.metrics.record_enqueue(timer.elapsed());
        info!(
            "Created match {} for agent '{}' - target: '{}'",
            record.id, agent_id, record.target
        );

        Ok(MatchHandle {
            placement: QueuePlacement::Created,
            record,
            opponent: None,
        })
    }

    async fn announce_pairing(&self, record: Match, competition_slug: &str) -> MatchHandle {
        let agent_a = record
            .agent_id(Slot::A)
            .map(|id| self.summary_for(id))
            .unwrap_or_else(|| AgentSummary {
                agent_id: String::new(),
                name: String::new(),
            });
        let agent_b = record
            .agent_id(Slot::B)
            .map(|id| self.summary_for(id))
            .unwrap_or_else(|| AgentSummary {
                agent_id: String::new(),
                name: String::new(),
            });

        info!(
            "Paired '{}' with '{}' in match {}",
            agent_a.name, agent_b.name, record.id
        );
        self.metrics.record_match_paired(competition_slug);

        let event = ArenaEvent::MatchPaired(MatchPaired {
            match_id: record.id,
            agent_a: agent_a.clone(),
            agent_b,
            task_description: record.task_description.clone(),
            start_location: record.start_location.clone(),
            target: record.target.clone(),
            time_limit_seconds: record.time_limit_seconds,
            timestamp: current_timestamp(),
        });
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!("Failed to publish match_paired for {}: {}", record.id, e);
        }

        MatchHandle {
            placement: QueuePlacement::Paired,
            record,
            opponent: Some(agent_a),
        }
    }

    /// Create a match with both slots open; `enqueue` fills it later
    pub fn create_open_match(&self, request: OpenMatchRequest) -> Result<Match> {
        let competition = self.provider.get_competition(&request.competition_slug)?;

        if let Some(seconds) = request.time_limit_seconds {
            if !time_limit_in_range(seconds) {
                return Err(ArenaError::Validation {
                    reason: format!(
                        "time_limit_seconds must be between 1 and {}",
                        MAX_TIME_LIMIT_SECONDS
                    ),
                }
                .into());
            }
        }
        let time_limit = request
            .time_limit_seconds
            .unwrap_or(competition.time_limit_seconds);

        let task = match &request.prompt {
            Some(prompt) => {
                if prompt.start_article.trim().is_empty() || prompt.target_article.trim().is_empty()
                {
                    return Err(ArenaError::Validation {
                        reason: "start_article and target_article are required".to_string(),
                    }
                    .into());
                }
                TaskAssignment::from_prompt(prompt, &self.wiki_base_url, time_limit)
            }
            None => {
                let mut task = self.provider.draw_task(&competition)?;
                task.time_limit_seconds = time_limit;
                task
            }
        };

        let record = self
            .matches
            .insert(Self::build_match(&competition.slug, task, None))?;
        self.metrics.record_match_created(&competition.slug);
        info!("Created open match {} for '{}'", record.id, competition.slug);

        Ok(record)
    }

    /// Active competitions with the number of matches waiting for an opponent
    pub fn competition_summaries(&self) -> Result<Vec<CompetitionSummary>> {
        self.provider
            .available_competitions()
            .into_iter()
            .map(|competition| {
                let waiting = self
                    .matches
                    .count_by_status(MatchStatus::WaitingForOpponent, Some(&competition.slug))?;
                Ok(CompetitionSummary {
                    prompt_count: competition.prompts.len(),
                    waiting_matches: waiting,
                    slug: competition.slug,
                    name: competition.name,
                    description: competition.description,
                    time_limit_seconds: competition.time_limit_seconds,
                })
            })
            .collect()
    }

    fn build_match(competition_slug: &str, task: TaskAssignment, first: Option<&str>) -> Match {
        Match {
            id: generate_match_id(),
            competition_slug: Some(competition_slug.to_string()),
            status: MatchStatus::WaitingForOpponent,
            task_description: task.task_description,
            start_location: task.start_location,
            target: task.target,
            time_limit_seconds: task.time_limit_seconds,
            participant_a: ParticipantState {
                agent_id: first.map(|id| id.to_string()),
                ..Default::default()
            },
            participant_b: ParticipantState::default(),
            created_at: current_timestamp(),
            started_at: None,
            ends_at: None,
            completed_at: None,
            verdict: None,
            winner_id: None,
            version: 0,
        }
    }
}
