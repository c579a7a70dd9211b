//! Main application configuration
//!
//! This module defines the primary configuration structures for the race-arena
//! service, including environment variable loading, TOML files and validation.

use crate::config::competition::{
    time_limit_in_range, CompetitionSettings, MAX_TIME_LIMIT_SECONDS,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub judge: JudgeSettings,
    pub rating: RatingSettings,
    pub telemetry: TelemetrySettings,
    pub sync: SyncSettings,
    pub competitions: Vec<CompetitionSettings>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interface to bind the HTTP server to
    pub host: String,
    /// Port for the API, websocket and health endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Base URL prepended to prompt start articles
    pub wiki_base_url: String,
    /// How many times a lost pairing race re-runs the open-match search
    pub max_pairing_attempts: u32,
    /// Maximum matches returned by the list endpoint
    pub list_limit: usize,
    /// How long past its window a match may sit in judging before it is closed unrated
    pub judging_grace_seconds: u64,
}

/// External judge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    /// Loaded from ANTHROPIC_API_KEY; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Elo settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    pub initial_rating: f64,
    pub k_factor: f64,
    /// A losing rating is never pushed below this value
    pub rating_floor: f64,
}

/// Live telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Per-match broadcast buffer; slower subscribers skip ahead
    pub channel_capacity: usize,
}

/// External identity sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Endpoint receiving stat updates; sync is disabled when unset
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            matchmaking: MatchmakingSettings::default(),
            judge: JudgeSettings::default(),
            rating: RatingSettings::default(),
            telemetry: TelemetrySettings::default(),
            sync: SyncSettings::default(),
            competitions: vec![CompetitionSettings::wikipedia_speedrun()],
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "race-arena".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            wiki_base_url: "https://en.wikipedia.org".to_string(),
            max_pairing_attempts: 3,
            list_limit: 50,
            judging_grace_seconds: 300,
        }
    }
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 512,
            timeout_seconds: 30,
            api_key: None,
        }
    }
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            initial_rating: 1200.0,
            k_factor: 32.0,
            rating_floor: 100.0,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: 10,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HOST") {
            self.service.host = host;
        }
        if let Some(port) = parse_env("HTTP_PORT")? {
            self.service.http_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Matchmaking settings
        if let Ok(base) = env::var("WIKI_BASE_URL") {
            self.matchmaking.wiki_base_url = base;
        }
        if let Some(grace) = parse_env("JUDGING_GRACE_SECONDS")? {
            self.matchmaking.judging_grace_seconds = grace;
        }

        // Judge settings
        if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
            if !key.trim().is_empty() {
                self.judge.api_key = Some(key);
            }
        }
        if let Ok(url) = env::var("JUDGE_API_URL") {
            self.judge.api_url = url;
        }
        if let Ok(model) = env::var("JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Some(timeout) = parse_env("JUDGE_TIMEOUT_SECONDS")? {
            self.judge.timeout_seconds = timeout;
        }

        // Rating settings
        if let Some(k) = parse_env("ELO_K_FACTOR")? {
            self.rating.k_factor = k;
        }
        if let Some(initial) = parse_env("INITIAL_ELO")? {
            self.rating.initial_rating = initial;
        }

        // Telemetry and sync
        if let Some(capacity) = parse_env("EVENT_CHANNEL_CAPACITY")? {
            self.telemetry.channel_capacity = capacity;
        }
        if let Ok(url) = env::var("IDENTITY_SYNC_URL") {
            self.sync.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }

        Ok(())
    }

    /// Grace period for matches stuck in judging, clamped to one day
    pub fn judging_grace(&self) -> chrono::Duration {
        let seconds = self.matchmaking.judging_grace_seconds.min(MAX_TIME_LIMIT_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get judge request timeout as Duration
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge.timeout_seconds)
    }

    /// Get identity sync request timeout as Duration
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.matchmaking.max_pairing_attempts == 0 {
        return Err(anyhow!("Max pairing attempts must be greater than 0"));
    }

    if config.judge.timeout_seconds == 0 {
        return Err(anyhow!("Judge timeout must be greater than 0"));
    }
    if config.judge.api_url.is_empty() {
        return Err(anyhow!("Judge API URL cannot be empty"));
    }

    if config.rating.k_factor <= 0.0 {
        return Err(anyhow!("Elo K factor must be positive"));
    }
    if config.rating.rating_floor < 0.0 || config.rating.initial_rating < config.rating.rating_floor
    {
        return Err(anyhow!(
            "Initial rating {} must be at or above the rating floor {}",
            config.rating.initial_rating,
            config.rating.rating_floor
        ));
    }

    if config.matchmaking.judging_grace_seconds > MAX_TIME_LIMIT_SECONDS {
        return Err(anyhow!(
            "Judging grace period must not exceed {} seconds",
            MAX_TIME_LIMIT_SECONDS
        ));
    }

    if config.telemetry.channel_capacity == 0 {
        return Err(anyhow!("Event channel capacity must be greater than 0"));
    }

    // Empty prompt pools are reported when the competition is used, not here
    for competition in &config.competitions {
        if competition.slug.trim().is_empty() {
            return Err(anyhow!("Competition slug cannot be empty"));
        }
        if !time_limit_in_range(competition.time_limit_seconds) {
            return Err(anyhow!(
                "Competition {} time limit must be between 1 and {} seconds",
                competition.slug,
                MAX_TIME_LIMIT_SECONDS
            ));
        }
    }

    Ok(())
}
