//! Metrics and monitoring for the arena service
//!
//! This module provides Prometheus metrics collection and the health and
//! metrics endpoints served next to the API.

pub mod collector;
pub mod health;

pub use collector::{
    MatchMetrics, MetricsCollector, MetricsTimer, ServiceMetrics, TelemetryMetrics, VerdictMetrics,
};
pub use health::{encode_metrics, health_router};
