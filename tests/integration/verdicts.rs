//! Verdict and settlement scenarios

use crate::fixtures::{snapshot, Arena, ScriptedJudge, RACE};
use race_arena::lifecycle::ClaimOutcome;
use race_arena::types::{Outcome, Verdict, VerdictTier};

fn judged(outcome: ClaimOutcome) -> Verdict {
    match outcome {
        ClaimOutcome::Judged { verdict, .. } => verdict,
        other => panic!("expected a judged claim, got {}", other.result()),
    }
}

#[tokio::test]
async fn test_reached_target_decides_without_judge() {
    let judge = ScriptedJudge::replying(r#"{"winner":"agent1","reasoning":"unused"}"#);
    let arena = Arena::new(Some(judge.clone()));
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Chemistry", 1, None))
        .await
        .unwrap();
    arena
        .lifecycle
        .push_frame(match_id, &bravo.id, snapshot("/wiki/Physics", 1, None))
        .await
        .unwrap();

    let verdict = judged(arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap());

    assert_eq!(verdict.winner, Outcome::B);
    assert_eq!(verdict.tier, VerdictTier::PathCheck);
    assert_eq!(verdict.winner_id.as_deref(), Some(bravo.id.as_str()));
    assert_eq!(judge.calls(), 0);
}

#[tokio::test]
async fn test_both_reached_fewer_moves_wins() {
    let arena = Arena::new(None);
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    for (agent, path) in [
        (&alpha.id, vec!["/wiki/Energy", "/wiki/Matter", "/wiki/Physics"]),
        (&bravo.id, vec!["/wiki/Physics"]),
    ] {
        for (moves, location) in path.into_iter().enumerate() {
            arena
                .lifecycle
                .push_frame(match_id, agent, snapshot(location, moves as u32 + 1, None))
                .await
                .unwrap();
        }
    }

    let verdict = judged(arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap());
    assert_eq!(verdict.winner, Outcome::B);
    assert_eq!(verdict.tier, VerdictTier::PathCheck);
    assert_eq!(arena.agent(&bravo.id).best_move_count, Some(1));
}

#[tokio::test]
async fn test_ambiguous_race_goes_to_judge() {
    let judge = ScriptedJudge::replying(
        "Looking at both screens:\n```json\n{\"winner\":\"agent2\",\"reasoning\":\"B is one link away\",\"confidence\":\"high\"}\n```",
    );
    let arena = Arena::new(Some(judge.clone()));
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Science", 0, None))
        .await
        .unwrap();
    arena
        .lifecycle
        .push_frame(match_id, &bravo.id, snapshot("/wiki/Natural_science", 1, None))
        .await
        .unwrap();

    let verdict = judged(arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap());

    assert_eq!(judge.calls(), 1);
    assert_eq!(verdict.winner, Outcome::B);
    assert_eq!(verdict.tier, VerdictTier::Judge);
    assert_eq!(verdict.reasoning, "B is one link away");

    let bravo = arena.agent(&bravo.id);
    let alpha = arena.agent(&alpha.id);
    assert_eq!(bravo.wins, 1);
    assert_eq!(alpha.losses, 1);
    assert!(bravo.elo_rating > 1000.0);
    assert!(alpha.elo_rating < 1000.0);
}

#[tokio::test]
async fn test_unreachable_judge_settles_as_draw() {
    let judge = ScriptedJudge::unreachable();
    let arena = Arena::new(Some(judge.clone()));
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    let outcome = arena.lifecycle.claim_victory(match_id, &bravo.id).await.unwrap();
    assert_eq!(outcome.result(), "judged");
    let verdict = judged(outcome);

    assert_eq!(judge.calls(), 1);
    assert_eq!(verdict.winner, Outcome::Draw);
    assert_eq!(verdict.tier, VerdictTier::Fallback);
    assert!(verdict.winner_id.is_none());

    for agent in [arena.agent(&alpha.id), arena.agent(&bravo.id)] {
        assert_eq!(agent.draws, 1);
        assert_eq!(agent.wins + agent.losses, 0);
        assert_eq!(agent.elo_rating, 1000.0);
    }
    assert_eq!(arena.publisher.count_events_of_type("match_complete"), 1);
}

#[tokio::test]
async fn test_missing_judge_settles_ambiguous_race_as_draw() {
    let arena = Arena::new(None);
    let (match_id, alpha, _bravo) = arena.active_match(RACE).await;

    let verdict = judged(arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap());
    assert_eq!(verdict.winner, Outcome::Draw);
    assert_eq!(verdict.tier, VerdictTier::Fallback);
}

#[tokio::test]
async fn test_second_claim_reports_completed_match() {
    let arena = Arena::new(None);
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Physics", 1, None))
        .await
        .unwrap();
    arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap();

    let again = arena.lifecycle.claim_victory(match_id, &bravo.id).await.unwrap();
    assert_eq!(again.result(), "complete");
    assert_eq!(again.record().winner_id.as_deref(), Some(alpha.id.as_str()));
    assert_eq!(arena.agent(&alpha.id).wins, 1);
    assert_eq!(arena.publisher.count_events_of_type("match_complete"), 1);
}
