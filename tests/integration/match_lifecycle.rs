//! Match lifecycle integration tests
//!
//! Covers queue conflicts, telemetry persistence, lazy expiry and the
//! guarantees that hold once a match is complete.

use crate::fixtures::{snapshot, Arena, RACE, SPRINT};
use race_arena::error::ArenaError;
use race_arena::lifecycle::ClaimOutcome;
use race_arena::types::MatchStatus;
use tokio::time::{sleep, Duration};

fn arena_error(err: &anyhow::Error) -> &ArenaError {
    err.downcast_ref::<ArenaError>()
        .expect("error should be an ArenaError")
}

#[tokio::test]
async fn test_enqueue_while_in_match_is_a_conflict() {
    let arena = Arena::new(None);
    let (match_id, alpha, _bravo) = arena.active_match(RACE).await;

    let err = arena.queue.enqueue(&alpha.id, RACE).await.unwrap_err();
    match arena_error(&err) {
        ArenaError::Conflict {
            match_id: existing,
            status,
            ..
        } => {
            assert_eq!(existing.as_deref(), Some(match_id.to_string().as_str()));
            assert_eq!(status.as_deref(), Some("active"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_waiting_agent_cannot_enqueue_twice() {
    let arena = Arena::new(None);
    let alpha = arena.register("alpha");

    arena.queue.enqueue(&alpha.id, RACE).await.unwrap();
    let err = arena.queue.enqueue(&alpha.id, RACE).await.unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Conflict { .. }));
}

#[tokio::test]
async fn test_frames_before_start_are_rejected() {
    let arena = Arena::new(None);
    let alpha = arena.register("alpha");
    let handle = arena.queue.enqueue(&alpha.id, RACE).await.unwrap();

    let err = arena
        .lifecycle
        .push_frame(handle.record.id, &alpha.id, snapshot("/wiki/Science", 0, None))
        .await
        .unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Validation { .. }));
}

#[tokio::test]
async fn test_outsider_cannot_push_frames_or_claim() {
    let arena = Arena::new(None);
    let (match_id, _alpha, _bravo) = arena.active_match(RACE).await;
    let outsider = arena.register("charlie");

    let err = arena
        .lifecycle
        .push_frame(match_id, &outsider.id, snapshot("/wiki/Physics", 1, None))
        .await
        .unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Forbidden { .. }));

    let err = arena
        .lifecycle
        .claim_victory(match_id, &outsider.id)
        .await
        .unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Forbidden { .. }));
}

#[tokio::test]
async fn test_progress_is_persisted_only_on_navigation() {
    let arena = Arena::new(None);
    let (match_id, alpha, _bravo) = arena.active_match(RACE).await;

    for (location, moves, thought) in [
        ("/wiki/Science", 0, None),
        ("/wiki/Science", 0, Some("scanning the lead")),
        ("/wiki/Natural_science", 1, Some("broader topic first")),
        ("/wiki/Physics", 2, Some("there it is")),
    ] {
        arena
            .lifecycle
            .push_frame(match_id, &alpha.id, snapshot(location, moves, thought))
            .await
            .unwrap();
    }

    let record = arena.matches.get(match_id).unwrap().unwrap();
    assert_eq!(
        record.participant_a.path,
        vec!["Science", "Natural science", "Physics"]
    );
    assert_eq!(record.participant_a.move_count, 2);
    assert_eq!(record.participant_a.reasoning.len(), 2);

    let history = arena.lifecycle.frame_history(match_id, &alpha.id).unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn test_frames_are_discarded_once_complete() {
    let arena = Arena::new(None);
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    arena
        .lifecycle
        .push_frame(match_id, &bravo.id, snapshot("/wiki/Physics", 1, None))
        .await
        .unwrap();
    arena.lifecycle.claim_victory(match_id, &bravo.id).await.unwrap();

    assert!(arena.frames.get_frame(match_id, &alpha.id).unwrap().is_none());
    assert!(arena.frames.get_frame(match_id, &bravo.id).unwrap().is_none());
    assert!(arena
        .lifecycle
        .frame_history(match_id, &bravo.id)
        .unwrap()
        .is_empty());

    let view = arena.lifecycle.match_view(match_id).await.unwrap();
    assert_eq!(view.status, MatchStatus::Complete);
    assert!(view.frames.is_none());

    // Late frames are refused and do not resurrect the stream
    let err = arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Physics", 3, None))
        .await
        .unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Validation { .. }));
    assert_eq!(arena.frames.tracked_streams(), 0);
}

#[tokio::test]
async fn test_expired_match_times_out_lazily() {
    let arena = Arena::new(None);
    let (match_id, alpha, bravo) = arena.active_match(SPRINT).await;

    arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Science", 0, None))
        .await
        .unwrap();

    sleep(Duration::from_millis(1200)).await;

    let err = arena
        .lifecycle
        .push_frame(match_id, &alpha.id, snapshot("/wiki/Physics", 1, None))
        .await
        .unwrap_err();
    assert!(matches!(arena_error(&err), ArenaError::Timeout { .. }));

    let record = arena.matches.get(match_id).unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Complete);
    assert!(record.verdict.is_none());
    assert!(record.winner_id.is_none());
    assert_eq!(arena.publisher.count_events_of_type("match_timeout"), 1);
    assert_eq!(arena.frames.tracked_streams(), 0);

    // A late claim reports the timeout and changes nothing
    let outcome = arena.lifecycle.claim_victory(match_id, &bravo.id).await.unwrap();
    assert_eq!(outcome.result(), "timeout");
    assert!(matches!(outcome, ClaimOutcome::TimedOut(_)));
    assert_eq!(arena.publisher.count_events_of_type("match_timeout"), 1);

    let alpha = arena.agent(&alpha.id);
    assert_eq!(alpha.matches_played(), 0);
    assert_eq!(alpha.elo_rating, 1000.0);
}

#[tokio::test]
async fn test_listing_sweeps_expired_matches() {
    let arena = Arena::new(None);
    let (match_id, _alpha, _bravo) = arena.active_match(SPRINT).await;

    sleep(Duration::from_millis(1200)).await;

    let active = arena
        .lifecycle
        .list_matches(Some(MatchStatus::Active))
        .await
        .unwrap();
    assert!(active.is_empty());

    let complete = arena
        .lifecycle
        .list_matches(Some(MatchStatus::Complete))
        .await
        .unwrap();
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].match_id, match_id);
}

#[tokio::test]
async fn test_profile_lists_recent_matches() {
    let arena = Arena::new(None);
    let (match_id, alpha, _bravo) = arena.active_match(RACE).await;
    arena.lifecycle.claim_victory(match_id, &alpha.id).await.unwrap();

    let profile = arena.registry.profile(&alpha.id).unwrap();
    assert_eq!(profile.recent_matches.len(), 1);
    assert_eq!(profile.recent_matches[0].match_id, match_id);
}
