//! Verdict engine: path check first, external judge only for ambiguous runs
//!
//! [`VerdictEngine::decide`] is infallible. Judge trouble of any kind ends in a
//! fallback draw so a match can never be stranded in `judging`.

use crate::metrics::MetricsCollector;
use crate::oracle::judge::{build_case, parse_judge_response, Judge, JudgeOutcome};
use crate::oracle::path::{check_paths, PathCheck, VerdictInput};
use crate::types::{Confidence, Outcome, Slot, Verdict, VerdictTier};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const NO_JUDGE_REASONING: &str = "Oracle unavailable (no API key). Match declared a draw.";
pub const JUDGE_FAILED_REASONING: &str =
    "Oracle failed to produce a verdict. Match declared a draw.";

pub struct VerdictEngine {
    judge: Option<Arc<dyn Judge>>,
    metrics: Arc<MetricsCollector>,
}

impl VerdictEngine {
    /// Create an engine; without a judge every ambiguous run is a fallback draw
    pub fn new(judge: Option<Arc<dyn Judge>>, metrics: Arc<MetricsCollector>) -> Self {
        Self { judge, metrics }
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    /// Decide a match
    pub async fn decide(&self, input: &VerdictInput) -> Verdict {
        let verdict = match check_paths(input) {
            PathCheck::Decided { outcome, reasoning } => {
                Self::verdict(input, outcome, reasoning, VerdictTier::PathCheck, Confidence::High)
            }
            PathCheck::Ambiguous { reasoning } => self.consult_judge(input, reasoning).await,
        };

        self.metrics.record_verdict(verdict.tier);
        info!(
            "Verdict via {:?}: {:?} (winner: {})",
            verdict.tier,
            verdict.winner,
            verdict.winner_id.as_deref().unwrap_or("none")
        );
        verdict
    }

    async fn consult_judge(&self, input: &VerdictInput, path_reasoning: String) -> Verdict {
        let Some(judge) = &self.judge else {
            warn!("No judge configured; declaring ambiguous match a draw");
            return Self::fallback(input, &path_reasoning, NO_JUDGE_REASONING);
        };

        debug!("Sending case to judge:\n{}", build_case(input));
        let started = Instant::now();
        let raw = match judge.judge(input).await {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.record_judge_call("error", started.elapsed());
                warn!("Judge call failed: {:#}", e);
                return Self::fallback(input, &path_reasoning, JUDGE_FAILED_REASONING);
            }
        };

        match parse_judge_response(&raw) {
            JudgeOutcome::Decisive {
                winner,
                reasoning,
                confidence,
            } => {
                self.metrics.record_judge_call("ok", started.elapsed());
                Self::verdict(input, winner.into(), reasoning, VerdictTier::Judge, confidence)
            }
            JudgeOutcome::Draw {
                reasoning,
                confidence,
            } => {
                self.metrics.record_judge_call("ok", started.elapsed());
                Self::verdict(input, Outcome::Draw, reasoning, VerdictTier::Judge, confidence)
            }
            JudgeOutcome::JudgeFailure { reasoning } => {
                self.metrics
                    .record_judge_call("unparseable", started.elapsed());
                warn!("Judge reply unusable: {}", reasoning);
                Self::fallback(input, &path_reasoning, JUDGE_FAILED_REASONING)
            }
        }
    }

    fn fallback(input: &VerdictInput, path_reasoning: &str, why: &str) -> Verdict {
        Self::verdict(
            input,
            Outcome::Draw,
            format!("{} {}", path_reasoning, why),
            VerdictTier::Fallback,
            Confidence::Medium,
        )
    }

    fn verdict(
        input: &VerdictInput,
        winner: Outcome,
        reasoning: String,
        tier: VerdictTier,
        confidence: Confidence,
    ) -> Verdict {
        let winner_id = winner
            .winning_slot()
            .and_then(|slot: Slot| input.side(slot).agent_id.clone());

        Verdict {
            winner,
            winner_id,
            reasoning,
            tier,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::path::SideEvidence;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedJudge {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedJudge {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(&self, _input: &VerdictInput) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| anyhow!("connection refused"))
        }
    }

    fn side(id: &str, path: &[&str], moves: u32) -> SideEvidence {
        SideEvidence {
            agent_id: Some(id.to_string()),
            name: id.to_string(),
            path: path.iter().map(|p| p.to_string()).collect(),
            last_location: path.last().map(|p| p.to_string()),
            move_count: moves,
            latest_image: None,
        }
    }

    fn engine(judge: Option<Arc<ScriptedJudge>>) -> VerdictEngine {
        VerdictEngine::new(
            judge.map(|j| j as Arc<dyn Judge>),
            Arc::new(MetricsCollector::default()),
        )
    }

    fn ambiguous() -> VerdictInput {
        VerdictInput {
            task_description: "Navigate from Music to Jazz".to_string(),
            target: "Jazz".to_string(),
            side_a: side("a1", &["Music", "Blues"], 1),
            side_b: side("b1", &["Music"], 0),
        }
    }

    #[tokio::test]
    async fn test_path_check_skips_judge() {
        let judge = ScriptedJudge::replying(r#"{"winner":"agent2","reasoning":"x"}"#);
        let engine = engine(Some(judge.clone()));

        let verdict = engine
            .decide(&VerdictInput {
                task_description: "race".to_string(),
                target: "Physics".to_string(),
                side_a: side("a1", &["Science", "Physics"], 1),
                side_b: side("b1", &["Science", "Chemistry"], 1),
            })
            .await;

        assert_eq!(verdict.winner, Outcome::A);
        assert_eq!(verdict.winner_id.as_deref(), Some("a1"));
        assert_eq!(verdict.tier, VerdictTier::PathCheck);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_consults_judge_once() {
        let judge = ScriptedJudge::replying(
            r#"{"winner":"agent1","reasoning":"Blues is adjacent to Jazz.","confidence":"high"}"#,
        );
        let engine = engine(Some(judge.clone()));

        let verdict = engine.decide(&ambiguous()).await;

        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
        assert_eq!(verdict.winner, Outcome::A);
        assert_eq!(verdict.winner_id.as_deref(), Some("a1"));
        assert_eq!(verdict.tier, VerdictTier::Judge);
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_judge_error_falls_back_to_draw() {
        let judge = ScriptedJudge::failing();
        let engine = engine(Some(judge.clone()));

        let verdict = engine.decide(&ambiguous()).await;

        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
        assert_eq!(verdict.winner, Outcome::Draw);
        assert_eq!(verdict.winner_id, None);
        assert_eq!(verdict.tier, VerdictTier::Fallback);
        assert!(verdict.reasoning.contains(JUDGE_FAILED_REASONING));
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back_to_draw() {
        let judge = ScriptedJudge::replying("agent one, obviously");
        let verdict = engine(Some(judge)).decide(&ambiguous()).await;

        assert_eq!(verdict.winner, Outcome::Draw);
        assert_eq!(verdict.tier, VerdictTier::Fallback);
    }

    #[tokio::test]
    async fn test_missing_judge_is_described() {
        let verdict = engine(None).decide(&ambiguous()).await;

        assert_eq!(verdict.winner, Outcome::Draw);
        assert_eq!(verdict.tier, VerdictTier::Fallback);
        assert!(verdict.reasoning.starts_with("Neither agent reached Jazz."));
        assert!(verdict.reasoning.ends_with(NO_JUDGE_REASONING));
    }
}
