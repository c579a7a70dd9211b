//! Elo rating calculator
//!
//! Wraps the skillratings Elo implementation (logistic expected score) and
//! applies a floor to the losing side after every decisive match.

use crate::config::RatingSettings;
use crate::error::{ArenaError, Result};
use serde::{Deserialize, Serialize};
use skillratings::elo::{elo, expected_score, EloConfig, EloRating};
use skillratings::Outcomes;

/// Ratings before and after one decisive match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub winner_old: f64,
    pub winner_new: f64,
    pub loser_old: f64,
    pub loser_new: f64,
}

impl RatingUpdate {
    pub fn winner_delta(&self) -> f64 {
        self.winner_new - self.winner_old
    }

    pub fn loser_delta(&self) -> f64 {
        self.loser_new - self.loser_old
    }
}

/// Trait for calculating rating changes after a match
pub trait RatingCalculator: Send + Sync {
    /// Ratings after a decisive result
    fn rate_decisive(&self, winner: f64, loser: f64) -> Result<RatingUpdate>;

    /// Probability that the first rating beats the second
    fn expected_score(&self, rating: f64, opponent: f64) -> f64;

    /// Rating given to newly registered agents
    fn initial_rating(&self) -> f64;
}

/// Elo with a fixed K factor and a loser floor
#[derive(Debug, Clone)]
pub struct EloCalculator {
    config: EloConfig,
    floor: f64,
    initial: f64,
}

impl EloCalculator {
    pub fn new(k_factor: f64, floor: f64, initial: f64) -> Result<Self> {
        if !(k_factor.is_finite() && k_factor > 0.0) {
            return Err(ArenaError::Configuration {
                message: format!("Elo K factor must be positive, got {}", k_factor),
            }
            .into());
        }
        if !floor.is_finite() || initial < floor {
            return Err(ArenaError::Configuration {
                message: format!(
                    "Initial rating {} must be at or above the floor {}",
                    initial, floor
                ),
            }
            .into());
        }

        Ok(Self {
            config: EloConfig { k: k_factor },
            floor,
            initial,
        })
    }

    pub fn from_settings(settings: &RatingSettings) -> Result<Self> {
        Self::new(
            settings.k_factor,
            settings.rating_floor,
            settings.initial_rating,
        )
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k
    }
}

impl Default for EloCalculator {
    fn default() -> Self {
        Self {
            config: EloConfig { k: 32.0 },
            floor: 100.0,
            initial: 1200.0,
        }
    }
}

impl RatingCalculator for EloCalculator {
    fn rate_decisive(&self, winner: f64, loser: f64) -> Result<RatingUpdate> {
        if !winner.is_finite() || !loser.is_finite() {
            return Err(ArenaError::Validation {
                reason: format!("Ratings must be finite, got {} and {}", winner, loser),
            }
            .into());
        }

        let (new_winner, new_loser) = elo(
            &EloRating { rating: winner },
            &EloRating { rating: loser },
            &Outcomes::WIN,
            &self.config,
        );

        Ok(RatingUpdate {
            winner_old: winner,
            winner_new: new_winner.rating,
            loser_old: loser,
            loser_new: new_loser.rating.max(self.floor),
        })
    }

    fn expected_score(&self, rating: f64, opponent: f64) -> f64 {
        expected_score(&EloRating { rating }, &EloRating { rating: opponent }).0
    }

    fn initial_rating(&self) -> f64 {
        self.initial
    }
}
