//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the race-arena service using
//! Prometheus metrics.

use crate::types::VerdictTier;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the arena service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Match lifecycle metrics
    match_metrics: MatchMetrics,

    /// Verdict engine metrics
    verdict_metrics: VerdictMetrics,

    /// Telemetry and spectator metrics
    telemetry_metrics: TelemetryMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Registered agents
    pub agents_registered_total: IntCounter,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Failed identity sync calls, never retried
    pub sync_failures_total: IntCounterVec,
}

/// Match lifecycle metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Matches created by competition type
    pub matches_created_total: IntCounterVec,

    /// Matches that reached ready_check
    pub matches_paired_total: IntCounterVec,

    /// Matches whose timed window opened
    pub matches_started_total: IntCounter,

    /// Completed matches by result (decisive, draw, timeout)
    pub matches_completed_total: IntCounterVec,

    /// Guarded writes lost to a concurrent caller, by operation
    pub races_lost_total: IntCounterVec,

    /// Queue request processing time
    pub enqueue_duration: Histogram,
}

/// Verdict engine metrics
#[derive(Clone)]
pub struct VerdictMetrics {
    /// Verdicts by deciding tier
    pub verdicts_total: IntCounterVec,

    /// Judge calls by status
    pub judge_requests_total: IntCounterVec,

    /// Judge round-trip time
    pub judge_duration: Histogram,

    /// Time from claim to settled record
    pub settlement_duration: Histogram,
}

/// Telemetry and spectator metrics
#[derive(Clone)]
pub struct TelemetryMetrics {
    /// Frames accepted, by whether the location changed
    pub frames_received_total: IntCounterVec,

    /// Connected websocket spectators
    pub spectators_connected: IntGauge,

    /// Events dropped for lagging subscribers
    pub events_lagged_total: IntCounter,

    /// Frame handling time
    pub frame_duration: HistogramVec,
}

fn tier_label(tier: VerdictTier) -> &'static str {
    match tier {
        VerdictTier::PathCheck => "path_check",
        VerdictTier::Judge => "judge",
        VerdictTier::Fallback => "fallback",
    }
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let verdict_metrics = VerdictMetrics::new(&registry)?;
        let telemetry_metrics = TelemetryMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            match_metrics,
            verdict_metrics,
            telemetry_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn verdicts(&self) -> &VerdictMetrics {
        &self.verdict_metrics
    }

    pub fn telemetry(&self) -> &TelemetryMetrics {
        &self.telemetry_metrics
    }

    pub fn record_agent_registered(&self) {
        self.service_metrics.agents_registered_total.inc();
    }

    /// Record a queue request being processed
    pub fn record_enqueue(&self, duration: Duration) {
        self.match_metrics
            .enqueue_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_match_created(&self, competition: &str) {
        self.match_metrics
            .matches_created_total
            .with_label_values(&[competition])
            .inc();
    }

    pub fn record_match_paired(&self, competition: &str) {
        self.match_metrics
            .matches_paired_total
            .with_label_values(&[competition])
            .inc();
    }

    pub fn record_match_started(&self) {
        self.match_metrics.matches_started_total.inc();
    }

    /// Record a completed match; `result` is decisive, draw or timeout
    pub fn record_match_completed(&self, result: &str) {
        self.match_metrics
            .matches_completed_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record a guarded write lost to another caller
    pub fn record_race_lost(&self, operation: &str) {
        self.match_metrics
            .races_lost_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_verdict(&self, tier: VerdictTier) {
        self.verdict_metrics
            .verdicts_total
            .with_label_values(&[tier_label(tier)])
            .inc();
    }

    /// Record a judge round trip; `status` is ok, error or unparseable
    pub fn record_judge_call(&self, status: &str, duration: Duration) {
        self.verdict_metrics
            .judge_requests_total
            .with_label_values(&[status])
            .inc();
        self.verdict_metrics
            .judge_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_settlement(&self, duration: Duration) {
        self.verdict_metrics
            .settlement_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_frame(&self, location_changed: bool, duration: Duration) {
        let label = if location_changed { "moved" } else { "same" };
        self.telemetry_metrics
            .frames_received_total
            .with_label_values(&[label])
            .inc();
        self.telemetry_metrics
            .frame_duration
            .with_label_values(&[label])
            .observe(duration.as_secs_f64());
    }

    pub fn record_spectator_connected(&self) {
        self.telemetry_metrics.spectators_connected.inc();
    }

    pub fn record_spectator_disconnected(&self) {
        self.telemetry_metrics.spectators_connected.dec();
    }

    pub fn record_events_lagged(&self, skipped: u64) {
        self.telemetry_metrics.events_lagged_total.inc_by(skipped);
    }

    pub fn record_sync_failure(&self, operation: &str) {
        self.service_metrics
            .sync_failures_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("race_arena_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let agents_registered_total = IntCounter::new(
            "race_arena_agents_registered_total",
            "Total agents registered",
        )?;
        registry.register(Box::new(agents_registered_total.clone()))?;

        let health_status = IntGauge::new(
            "race_arena_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("race_arena_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let sync_failures_total = IntCounterVec::new(
            Opts::new(
                "race_arena_sync_failures_total",
                "Failed external identity sync calls",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(sync_failures_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            agents_registered_total,
            health_status,
            component_health,
            sync_failures_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_created_total = IntCounterVec::new(
            Opts::new("race_arena_matches_created_total", "Total matches created"),
            &["competition"],
        )?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let matches_paired_total = IntCounterVec::new(
            Opts::new("race_arena_matches_paired_total", "Total matches paired"),
            &["competition"],
        )?;
        registry.register(Box::new(matches_paired_total.clone()))?;

        let matches_started_total = IntCounter::new(
            "race_arena_matches_started_total",
            "Total matches whose window opened",
        )?;
        registry.register(Box::new(matches_started_total.clone()))?;

        let matches_completed_total = IntCounterVec::new(
            Opts::new(
                "race_arena_matches_completed_total",
                "Total matches completed",
            ),
            &["result"],
        )?;
        registry.register(Box::new(matches_completed_total.clone()))?;

        let races_lost_total = IntCounterVec::new(
            Opts::new(
                "race_arena_races_lost_total",
                "Guarded writes lost to a concurrent caller",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(races_lost_total.clone()))?;

        let enqueue_duration = Histogram::with_opts(
            HistogramOpts::new(
                "race_arena_enqueue_duration_seconds",
                "Queue processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(enqueue_duration.clone()))?;

        Ok(Self {
            matches_created_total,
            matches_paired_total,
            matches_started_total,
            matches_completed_total,
            races_lost_total,
            enqueue_duration,
        })
    }
}

impl VerdictMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let verdicts_total = IntCounterVec::new(
            Opts::new("race_arena_verdicts_total", "Verdicts by deciding tier"),
            &["tier"],
        )?;
        registry.register(Box::new(verdicts_total.clone()))?;

        let judge_requests_total = IntCounterVec::new(
            Opts::new("race_arena_judge_requests_total", "External judge calls"),
            &["status"],
        )?;
        registry.register(Box::new(judge_requests_total.clone()))?;

        let judge_duration = Histogram::with_opts(
            HistogramOpts::new(
                "race_arena_judge_duration_seconds",
                "External judge round-trip time",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(judge_duration.clone()))?;

        let settlement_duration = Histogram::with_opts(
            HistogramOpts::new(
                "race_arena_settlement_duration_seconds",
                "Time from claim to settled match",
            )
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(settlement_duration.clone()))?;

        Ok(Self {
            verdicts_total,
            judge_requests_total,
            judge_duration,
            settlement_duration,
        })
    }
}

impl TelemetryMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let frames_received_total = IntCounterVec::new(
            Opts::new("race_arena_frames_received_total", "Frames accepted"),
            &["location"],
        )?;
        registry.register(Box::new(frames_received_total.clone()))?;

        let spectators_connected = IntGauge::new(
            "race_arena_spectators_connected",
            "Connected websocket spectators",
        )?;
        registry.register(Box::new(spectators_connected.clone()))?;

        let events_lagged_total = IntCounter::new(
            "race_arena_events_lagged_total",
            "Events skipped by lagging subscribers",
        )?;
        registry.register(Box::new(events_lagged_total.clone()))?;

        let frame_duration = HistogramVec::new(
            HistogramOpts::new(
                "race_arena_frame_duration_seconds",
                "Frame handling time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["location"],
        )?;
        registry.register(Box::new(frame_duration.clone()))?;

        Ok(Self {
            frames_received_total,
            spectators_connected,
            events_lagged_total,
            frame_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
