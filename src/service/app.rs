//! Main application state and service coordination
//!
//! This module contains the AppState that wires stores, the event bus, the
//! oracle and settlement into the components the HTTP layer calls.

use crate::config::AppConfig;
use crate::events::{BroadcastEventBus, EventPublisher};
use crate::lifecycle::{AgentRegistry, MatchLifecycle};
use crate::lobby::{CompetitionProvider, QueueManager, ReadinessBarrier, StaticCompetitionProvider};
use crate::metrics::MetricsCollector;
use crate::oracle::{AnthropicJudge, Judge, VerdictEngine};
use crate::rating::{identity_sync_from_settings, EloCalculator, IdentitySync, Settlement};
use crate::store::{AgentStore, InMemoryAgentStore, InMemoryMatchStore, MatchStore};
use crate::telemetry::FrameStore;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("HTTP server error: {message}")]
    Server { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    matches: Arc<dyn MatchStore>,
    agents: Arc<dyn AgentStore>,
    bus: Arc<BroadcastEventBus>,
    frames: Arc<FrameStore>,
    provider: Arc<dyn CompetitionProvider>,

    queue: QueueManager,
    readiness: ReadinessBarrier,
    lifecycle: MatchLifecycle,
    registry: AgentRegistry,
    engine: Arc<VerdictEngine>,

    metrics: Arc<MetricsCollector>,
    started_at: Instant,
    is_running: RwLock<bool>,
}

impl AppState {
    /// Initialize the application with the configured judge and identity service
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing race-arena service");
        info!(
            "Configuration: service={}, competitions={}, judge={}",
            config.service.name,
            config.competitions.len(),
            if config.judge.api_key.is_some() {
                config.judge.model.as_str()
            } else {
                "none"
            }
        );

        let http = Self::initialize_http_client()?;
        let judge = AnthropicJudge::from_settings(http.clone(), &config.judge)
            .map(|judge| Arc::new(judge) as Arc<dyn Judge>);
        let identity = identity_sync_from_settings(http, &config.sync);

        Self::assemble(config, judge, identity)
    }

    /// Wire every component from explicit collaborators
    pub fn assemble(
        config: AppConfig,
        judge: Option<Arc<dyn Judge>>,
        identity: Arc<dyn IdentitySync>,
    ) -> Result<Self, ServiceError> {
        let metrics = Self::initialize_metrics()?;

        let matches: Arc<dyn MatchStore> = Arc::new(InMemoryMatchStore::new());
        let agents: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
        let bus = Arc::new(BroadcastEventBus::new(config.telemetry.channel_capacity));
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let frames = Arc::new(FrameStore::new(publisher.clone()));

        let provider: Arc<dyn CompetitionProvider> = Arc::new(
            StaticCompetitionProvider::new(
                config.competitions.clone(),
                config.matchmaking.wiki_base_url.clone(),
            )
            .map_err(|e| ServiceError::Configuration {
                message: format!("Invalid competitions: {}", e),
            })?,
        );

        let calculator = EloCalculator::from_settings(&config.rating).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Invalid rating settings: {}", e),
            }
        })?;

        let engine = Arc::new(VerdictEngine::new(judge, metrics.clone()));
        let settlement = Arc::new(Settlement::new(
            matches.clone(),
            agents.clone(),
            frames.clone(),
            publisher.clone(),
            Arc::new(calculator),
            identity.clone(),
            metrics.clone(),
        ));

        let queue = QueueManager::new(
            matches.clone(),
            agents.clone(),
            provider.clone(),
            publisher.clone(),
            metrics.clone(),
        )
        .with_max_pairing_attempts(config.matchmaking.max_pairing_attempts)
        .with_wiki_base_url(config.matchmaking.wiki_base_url.clone());

        let readiness = ReadinessBarrier::new(
            matches.clone(),
            agents.clone(),
            publisher.clone(),
            metrics.clone(),
        );

        let lifecycle = MatchLifecycle::new(
            matches.clone(),
            agents.clone(),
            frames.clone(),
            publisher,
            engine.clone(),
            settlement,
            metrics.clone(),
        )
        .with_list_limit(config.matchmaking.list_limit)
        .with_judging_grace(config.judging_grace());

        let registry = AgentRegistry::new(
            agents.clone(),
            matches.clone(),
            identity,
            metrics.clone(),
            config.rating.initial_rating,
        );

        if !engine.has_judge() {
            info!("No judge credentials; ambiguous matches will settle as draws");
        }

        Ok(Self {
            config,
            matches,
            agents,
            bus,
            frames,
            provider,
            queue,
            readiness,
            lifecycle,
            registry,
            engine,
            metrics,
            started_at: Instant::now(),
            is_running: RwLock::new(false),
        })
    }

    /// Mark the service as accepting traffic
    pub async fn start(&self) {
        *self.is_running.write().await = true;
        self.metrics.update_health_status(2);
        info!("✅ race-arena service started");
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) {
        info!("Starting graceful shutdown of race-arena service");
        *self.is_running.write().await = false;
        self.metrics.update_health_status(0);

        let agents = self.agents.agent_count().unwrap_or(0);
        info!(
            "Final service statistics: agents={}, open channels={}, frame streams={}",
            agents,
            self.bus.open_channels(),
            self.frames.tracked_streams()
        );
        info!("✅ race-arena service shutdown completed");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn matches(&self) -> &Arc<dyn MatchStore> {
        &self.matches
    }

    pub fn agents(&self) -> &Arc<dyn AgentStore> {
        &self.agents
    }

    pub fn bus(&self) -> &Arc<BroadcastEventBus> {
        &self.bus
    }

    pub fn frames(&self) -> &Arc<FrameStore> {
        &self.frames
    }

    pub fn provider(&self) -> &Arc<dyn CompetitionProvider> {
        &self.provider
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn readiness(&self) -> &ReadinessBarrier {
        &self.readiness
    }

    pub fn lifecycle(&self) -> &MatchLifecycle {
        &self.lifecycle
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<VerdictEngine> {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        MetricsCollector::new()
            .map(Arc::new)
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })
    }

    fn initialize_http_client() -> Result<reqwest::Client, ServiceError> {
        reqwest::Client::builder()
            .user_agent(concat!("race-arena/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to build HTTP client: {}", e),
            })
    }
}
