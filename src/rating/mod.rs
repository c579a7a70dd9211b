//! Settlement and rating updates
//!
//! This module turns verdicts into persistent stats: Elo via the skillratings
//! crate, exactly-once settlement of the match record, and fire-and-forget
//! sync with the external identity service.

pub mod elo;
pub mod settlement;
pub mod sync;

// Re-export commonly used types
pub use elo::{EloCalculator, RatingCalculator, RatingUpdate};
pub use settlement::{Settlement, SettlementOutcome, SettlementReport};
pub use sync::{
    identity_sync_from_settings, spawn_identity_mint, spawn_stat_sync, IdentitySync,
    LocalIdentitySync, StatSync, WebhookIdentitySync,
};
