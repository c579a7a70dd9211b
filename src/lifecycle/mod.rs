//! Match lifecycle from the start of the timed window to settlement,
//! plus the agent registry and the read models served over HTTP.

pub mod controller;
pub mod registry;
pub mod view;

pub use controller::{ClaimOutcome, MatchLifecycle};
pub use registry::AgentRegistry;
pub use view::{AgentProfile, FrameSummaries, FrameSummary, MatchListing, MatchView, ParticipantView};
