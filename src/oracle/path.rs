//! Deterministic path check
//!
//! A side reached the target when its normalized visited locations contain the
//! normalized target title. Matching is plain string equality; redirects and
//! synonyms count as misses.

use crate::types::{AgentId, Outcome, Slot};
use crate::utils::{display_title, normalize_location};
use serde::Serialize;

/// What the oracle knows about one participant
#[derive(Debug, Clone, Default, Serialize)]
pub struct SideEvidence {
    pub agent_id: Option<AgentId>,
    pub name: String,
    /// Visited locations or titles, oldest first
    pub path: Vec<String>,
    pub last_location: Option<String>,
    pub move_count: u32,
    /// Latest screenshot, base64 encoded
    #[serde(skip)]
    pub latest_image: Option<String>,
}

impl SideEvidence {
    /// Locations to test; the final location stands in for an empty history
    fn locations(&self) -> impl Iterator<Item = &String> {
        let fallback = if self.path.is_empty() {
            self.last_location.as_ref()
        } else {
            None
        };
        self.path.iter().chain(fallback)
    }

    pub fn reached(&self, target: &str) -> bool {
        let target = normalize_location(target);
        !target.is_empty() && self.locations().any(|loc| normalize_location(loc) == target)
    }

    /// Short human readable path, e.g. `Science -> Physics`
    pub fn path_summary(&self) -> String {
        let titles: Vec<String> = self.locations().map(|loc| display_title(loc)).collect();
        if titles.is_empty() {
            "(no moves recorded)".to_string()
        } else {
            titles.join(" -> ")
        }
    }
}

/// Everything the verdict engine needs to decide a match
#[derive(Debug, Clone, Serialize)]
pub struct VerdictInput {
    pub task_description: String,
    pub target: String,
    pub side_a: SideEvidence,
    pub side_b: SideEvidence,
}

impl VerdictInput {
    pub fn side(&self, slot: Slot) -> &SideEvidence {
        match slot {
            Slot::A => &self.side_a,
            Slot::B => &self.side_b,
        }
    }
}

/// Result of the deterministic tier
#[derive(Debug, Clone, PartialEq)]
pub enum PathCheck {
    /// Outcome fixed by the paths; never overridden by the judge
    Decided { outcome: Outcome, reasoning: String },
    /// Neither side reached the target
    Ambiguous { reasoning: String },
}

pub fn check_paths(input: &VerdictInput) -> PathCheck {
    let target = display_title(&input.target);
    let a = &input.side_a;
    let b = &input.side_b;

    match (a.reached(&input.target), b.reached(&input.target)) {
        (true, true) if a.move_count == b.move_count => PathCheck::Decided {
            outcome: Outcome::Draw,
            reasoning: format!(
                "Both agents reached {} in {} moves.",
                target, a.move_count
            ),
        },
        (true, true) => {
            let (winner, fewer, more) = if a.move_count < b.move_count {
                (Slot::A, a.move_count, b.move_count)
            } else {
                (Slot::B, b.move_count, a.move_count)
            };
            PathCheck::Decided {
                outcome: winner.into(),
                reasoning: format!(
                    "Both agents reached {}; {} did it in {} moves against {}.",
                    target,
                    input.side(winner).name,
                    fewer,
                    more
                ),
            }
        }
        (true, false) | (false, true) => {
            let winner = if a.reached(&input.target) { Slot::A } else { Slot::B };
            PathCheck::Decided {
                outcome: winner.into(),
                reasoning: format!(
                    "{} reached {} in {} moves; {} did not.",
                    input.side(winner).name,
                    target,
                    input.side(winner).move_count,
                    input.side(winner.other()).name
                ),
            }
        }
        (false, false) => PathCheck::Ambiguous {
            reasoning: format!("Neither agent reached {}.", target),
        },
    }
}
