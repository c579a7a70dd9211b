//! Configuration management for the race-arena service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the arena service.

pub mod app;
pub mod competition;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, JudgeSettings, MatchmakingSettings, RatingSettings,
    ServiceSettings, SyncSettings, TelemetrySettings,
};
pub use competition::{time_limit_in_range, CompetitionSettings, MAX_TIME_LIMIT_SECONDS};
