//! Verdict engine (oracle)
//!
//! Two tiers: a deterministic path check whose answer is final, and an
//! external judge consulted only when neither side reached the target.

pub mod engine;
pub mod judge;
pub mod path;

pub use engine::VerdictEngine;
pub use judge::{parse_judge_response, AnthropicJudge, Judge, JudgeOutcome};
pub use path::{check_paths, PathCheck, SideEvidence, VerdictInput};
