//! Fire-and-forget sync with the external identity service
//!
//! Every call runs on a detached task. Failures are logged and counted, never
//! retried, and never reach the request that triggered them.

use crate::config::SyncSettings;
use crate::metrics::MetricsCollector;
use crate::store::AgentStore;
use crate::types::{Agent, AgentId, MatchId};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stats pushed to the identity service after settlement
#[derive(Debug, Clone, Serialize)]
pub struct StatSync {
    pub agent_id: AgentId,
    pub identity_token: Option<String>,
    pub match_id: MatchId,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub elo_rating: f64,
}

impl StatSync {
    pub fn from_agent(agent: &Agent, match_id: MatchId) -> Self {
        Self {
            agent_id: agent.id.clone(),
            identity_token: agent.identity_token.clone(),
            match_id,
            wins: agent.wins,
            losses: agent.losses,
            draws: agent.draws,
            elo_rating: agent.elo_rating,
        }
    }
}

/// Trait for the external identity collaborator
#[async_trait]
pub trait IdentitySync: Send + Sync {
    /// Mint an identity for a newly registered agent, returning its token id
    async fn mint_identity(&self, agent: &Agent) -> Result<String>;

    /// Push an agent's stats after a settled match
    async fn push_stats(&self, stats: &StatSync) -> Result<()>;
}

/// Identity sync used when no webhook is configured: tokens are minted
/// locally and stats stay in-process
#[derive(Debug, Default, Clone)]
pub struct LocalIdentitySync;

#[async_trait]
impl IdentitySync for LocalIdentitySync {
    async fn mint_identity(&self, _agent: &Agent) -> Result<String> {
        let simple = Uuid::new_v4().simple().to_string();
        Ok(format!("0g_{}", &simple[..8]))
    }

    async fn push_stats(&self, stats: &StatSync) -> Result<()> {
        debug!(
            "No identity webhook configured; stats for {} kept local",
            stats.agent_id
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WebhookPayload<'a> {
    Mint {
        agent_id: &'a str,
        name: &'a str,
        owner: Option<&'a str>,
    },
    Stats(&'a StatSync),
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    token_id: String,
}

/// Identity sync posting JSON to a webhook
#[derive(Clone)]
pub struct WebhookIdentitySync {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookIdentitySync {
    pub fn new(http: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<String> {
        let resp = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .context("identity webhook request")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet: String = body.chars().take(400).collect();
            return Err(anyhow!("identity webhook {}: {}", status.as_u16(), snippet));
        }
        Ok(body)
    }
}

#[async_trait]
impl IdentitySync for WebhookIdentitySync {
    async fn mint_identity(&self, agent: &Agent) -> Result<String> {
        let body = self
            .post(&WebhookPayload::Mint {
                agent_id: &agent.id,
                name: &agent.name,
                owner: agent.owner.as_deref(),
            })
            .await?;
        let parsed: MintResponse =
            serde_json::from_str(&body).context("identity webhook json parse")?;
        Ok(parsed.token_id)
    }

    async fn push_stats(&self, stats: &StatSync) -> Result<()> {
        self.post(&WebhookPayload::Stats(stats)).await.map(|_| ())
    }
}

/// Webhook sync when a URL is configured, local otherwise
pub fn identity_sync_from_settings(
    http: reqwest::Client,
    settings: &SyncSettings,
) -> Arc<dyn IdentitySync> {
    match settings.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Arc::new(WebhookIdentitySync::new(
            http,
            url,
            Duration::from_secs(settings.timeout_seconds),
        )),
        None => Arc::new(LocalIdentitySync),
    }
}

/// Mint an identity on a detached task and record the token when it arrives
pub fn spawn_identity_mint(
    sync: Arc<dyn IdentitySync>,
    agents: Arc<dyn AgentStore>,
    metrics: Arc<MetricsCollector>,
    agent: Agent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sync.mint_identity(&agent).await {
            Ok(token) => match agents.set_identity_token(&agent.id, &token) {
                Ok(()) => info!("Minted identity {} for agent {}", token, agent.id),
                Err(e) => warn!("Failed to record identity for agent {}: {}", agent.id, e),
            },
            Err(e) => {
                metrics.record_sync_failure("mint");
                warn!("Identity mint failed for agent {}: {:#}", agent.id, e);
            }
        }
    })
}

/// Push settled stats on a detached task; never retried
pub fn spawn_stat_sync(
    sync: Arc<dyn IdentitySync>,
    metrics: Arc<MetricsCollector>,
    updates: Vec<StatSync>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for stats in &updates {
            if let Err(e) = sync.push_stats(stats).await {
                metrics.record_sync_failure("stats");
                warn!(
                    "Stat sync failed for agent {} after match {}: {:#}",
                    stats.agent_id, stats.match_id, e
                );
            }
        }
    })
}
