//! Test fixtures and scripted collaborators for integration testing

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use race_arena::config::CompetitionSettings;
use race_arena::events::{EventPublisher, MockEventPublisher};
use race_arena::lifecycle::{AgentRegistry, MatchLifecycle};
use race_arena::lobby::{CompetitionProvider, QueueManager, ReadinessBarrier, StaticCompetitionProvider};
use race_arena::metrics::MetricsCollector;
use race_arena::oracle::{Judge, VerdictEngine, VerdictInput};
use race_arena::rating::{EloCalculator, LocalIdentitySync, Settlement};
use race_arena::store::{AgentStore, InMemoryAgentStore, InMemoryMatchStore, MatchStore, NewAgent};
use race_arena::telemetry::FrameStore;
use race_arena::types::{Agent, MatchId, Prompt, Snapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const RACE: &str = "test-race";
pub const SPRINT: &str = "test-sprint";

/// Judge that replays a canned answer and counts calls
pub struct ScriptedJudge {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Behaves like an unreachable upstream
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(&self, _input: &VerdictInput) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

/// Two competitions: a normal race and a one-second sprint for timeout tests
pub fn test_competitions() -> Vec<CompetitionSettings> {
    let single = |slug: &str, limit: u64| CompetitionSettings {
        slug: slug.to_string(),
        name: slug.to_string(),
        description: "Reach Physics from Science".to_string(),
        time_limit_seconds: limit,
        prompts: vec![Prompt {
            start_article: "/wiki/Science".to_string(),
            target_article: "Physics".to_string(),
        }],
        active: true,
    };
    vec![single(RACE, 120), single(SPRINT, 1)]
}

/// Every component wired over in-memory stores and a capturing publisher
pub struct Arena {
    pub matches: Arc<dyn MatchStore>,
    pub agents: Arc<dyn AgentStore>,
    pub frames: Arc<FrameStore>,
    pub publisher: Arc<MockEventPublisher>,
    pub metrics: Arc<MetricsCollector>,
    pub queue: QueueManager,
    pub readiness: ReadinessBarrier,
    pub lifecycle: MatchLifecycle,
    pub registry: AgentRegistry,
}

impl Arena {
    pub fn new(judge: Option<Arc<ScriptedJudge>>) -> Self {
        let matches: Arc<dyn MatchStore> = Arc::new(InMemoryMatchStore::new());
        let agents: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let events: Arc<dyn EventPublisher> = publisher.clone();
        let metrics = Arc::new(MetricsCollector::default());
        let frames = Arc::new(FrameStore::new(events.clone()));
        let identity = Arc::new(LocalIdentitySync);

        let provider: Arc<dyn CompetitionProvider> = Arc::new(
            StaticCompetitionProvider::new(test_competitions(), "https://en.wikipedia.org")
                .expect("valid test competitions"),
        );

        let engine = Arc::new(VerdictEngine::new(
            judge.map(|j| j as Arc<dyn Judge>),
            metrics.clone(),
        ));
        let settlement = Arc::new(Settlement::new(
            matches.clone(),
            agents.clone(),
            frames.clone(),
            events.clone(),
            Arc::new(EloCalculator::default()),
            identity.clone(),
            metrics.clone(),
        ));

        Self {
            queue: QueueManager::new(
                matches.clone(),
                agents.clone(),
                provider,
                events.clone(),
                metrics.clone(),
            ),
            readiness: ReadinessBarrier::new(
                matches.clone(),
                agents.clone(),
                events.clone(),
                metrics.clone(),
            ),
            lifecycle: MatchLifecycle::new(
                matches.clone(),
                agents.clone(),
                frames.clone(),
                events,
                engine,
                settlement,
                metrics.clone(),
            ),
            registry: AgentRegistry::new(
                agents.clone(),
                matches.clone(),
                identity,
                metrics.clone(),
                1000.0,
            ),
            matches,
            agents,
            frames,
            publisher,
            metrics,
        }
    }

    pub fn register(&self, name: &str) -> Agent {
        self.registry
            .register(NewAgent {
                name: name.to_string(),
                description: None,
                owner: None,
            })
            .expect("registration succeeds")
    }

    pub fn agent(&self, id: &str) -> Agent {
        self.agents.get(id).unwrap().expect("agent exists")
    }

    /// Register two agents and drive them into an active match
    pub async fn active_match(&self, competition: &str) -> (MatchId, Agent, Agent) {
        let a = self.register("alpha");
        let b = self.register("bravo");

        let first = self.queue.enqueue(&a.id, competition).await.unwrap();
        let second = self.queue.enqueue(&b.id, competition).await.unwrap();
        assert_eq!(first.record.id, second.record.id);

        let match_id = first.record.id;
        self.readiness.signal_ready(match_id, &a.id).await.unwrap();
        let report = self.readiness.signal_ready(match_id, &b.id).await.unwrap();
        assert!(report.match_started());

        (match_id, a, b)
    }
}

pub fn snapshot(location: &str, moves: u32, thought: Option<&str>) -> Snapshot {
    Snapshot {
        image: "iVBORw0KGgo=".to_string(),
        location: format!("https://en.wikipedia.org{}", location),
        move_count: moves,
        reasoning: thought.map(str::to_string),
    }
}
