//! Health checks and service statistics
//!
//! Liveness only asks whether the service is running. Readiness also checks
//! the stores; a missing judge degrades the service but keeps it ready, since
//! ambiguous matches still settle (as draws).

use crate::service::app::AppState;
use crate::types::MatchStatus;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported on the metrics endpoint
    pub fn gauge_value(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.gauge_value() <= other.gauge_value() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl ComponentCheck {
    fn timed(name: &str, started: Instant, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub agents_registered: usize,
    pub matches_waiting: usize,
    pub matches_in_ready_check: usize,
    pub matches_active: usize,
    pub matches_judging: usize,
    pub open_channels: usize,
    pub frame_streams: usize,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Full health check of every component
    pub async fn check(app_state: &AppState) -> Result<Self> {
        let service_check = Self::check_service_running(app_state).await;
        let store_check = Self::check_stores(app_state);
        let judge_check = Self::check_judge(app_state);

        let status = [&service_check, &store_check, &judge_check]
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        for check in [&service_check, &store_check, &judge_check] {
            app_state
                .metrics()
                .update_component_health(&check.name, check.status != HealthStatus::Unhealthy);
        }
        app_state.metrics().update_health_status(status.gauge_value());

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks: vec![service_check, store_check, judge_check],
            stats: Self::gather_service_stats(app_state),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: &AppState) -> HealthStatus {
        if app_state.is_running().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(app_state: &AppState) -> HealthStatus {
        if !app_state.is_running().await {
            return HealthStatus::Unhealthy;
        }
        Self::check_stores(app_state)
            .status
            .worst(Self::check_judge(app_state).status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };
        ComponentCheck::timed("service_running", start, status, message)
    }

    fn check_stores(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();
        let probe = app_state
            .agents()
            .agent_count()
            .and_then(|_| app_state.matches().count_by_status(MatchStatus::Active, None));

        let (status, message) = match probe {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Store health probe failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };
        ComponentCheck::timed("stores", start, status, message)
    }

    fn check_judge(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) = if app_state.engine().has_judge() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Degraded,
                Some("No judge credentials; ambiguous matches settle as draws".to_string()),
            )
        };
        ComponentCheck::timed("judge", start, status, message)
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let count = |status: MatchStatus| {
            app_state
                .matches()
                .count_by_status(status, None)
                .unwrap_or(0)
        };

        ServiceStats {
            agents_registered: app_state.agents().agent_count().unwrap_or(0),
            matches_waiting: count(MatchStatus::WaitingForOpponent),
            matches_in_ready_check: count(MatchStatus::ReadyCheck),
            matches_active: count(MatchStatus::Active),
            matches_judging: count(MatchStatus::Judging),
            open_channels: app_state.bus().open_channels(),
            frame_streams: app_state.frames().tracked_streams(),
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::rating::LocalIdentitySync;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::assemble(AppConfig::default(), None, Arc::new(LocalIdentitySync)).unwrap()
    }

    #[tokio::test]
    async fn test_not_running_is_unhealthy() {
        let state = state();
        assert_eq!(
            HealthCheck::liveness_check(&state).await,
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(&state).await,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_missing_judge_degrades() {
        let state = state();
        state.start().await;

        assert_eq!(
            HealthCheck::readiness_check(&state).await,
            HealthStatus::Degraded
        );

        let health = HealthCheck::check(&state).await.unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.checks.len(), 3);
        assert!(health.to_json().unwrap().contains("\"judge\""));
    }

    #[test]
    fn test_worst_status_wins() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
    }
}
