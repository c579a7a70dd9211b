//! Concurrent claims, ready signals and queue requests

use crate::fixtures::{snapshot, Arena, ScriptedJudge, RACE};
use futures::future::join_all;
use race_arena::lifecycle::ClaimOutcome;
use race_arena::lobby::QueuePlacement;
use race_arena::types::MatchStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_claims_settle_once() {
    let arena = Arc::new(Arena::new(Some(ScriptedJudge::replying(
        r#"{"winner":"agent1","reasoning":"closer"}"#,
    ))));
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    let claims = (0..8).map(|i| {
        let arena = arena.clone();
        let agent = if i % 2 == 0 { alpha.id.clone() } else { bravo.id.clone() };
        tokio::spawn(async move { arena.lifecycle.claim_victory(match_id, &agent).await })
    });

    let outcomes: Vec<ClaimOutcome> = join_all(claims)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let judged = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Judged { .. }))
        .count();
    assert_eq!(judged, 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o.result(), "judged" | "already_judging" | "complete")));

    let alpha = arena.agent(&alpha.id);
    let bravo = arena.agent(&bravo.id);
    assert_eq!(alpha.matches_played(), 1);
    assert_eq!(bravo.matches_played(), 1);
    assert_eq!(alpha.wins, 1);
    assert_eq!(arena.publisher.count_events_of_type("judging_started"), 1);
    assert_eq!(arena.publisher.count_events_of_type("match_complete"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_ready_starts_once() {
    for _ in 0..20 {
        let arena = Arc::new(Arena::new(None));
        let alpha = arena.register("alpha");
        let bravo = arena.register("bravo");
        arena.queue.enqueue(&alpha.id, RACE).await.unwrap();
        let paired = arena.queue.enqueue(&bravo.id, RACE).await.unwrap();
        let match_id = paired.record.id;

        let signals = [alpha.id.clone(), bravo.id.clone()].map(|agent| {
            let arena = arena.clone();
            tokio::spawn(async move { arena.readiness.signal_ready(match_id, &agent).await })
        });
        let reports: Vec<_> = join_all(signals)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let record = arena.matches.get(match_id).unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Active);
        assert!(record.participant_a.ready && record.participant_b.ready);
        assert_eq!(arena.publisher.count_events_of_type("match_start"), 1);
        assert!(reports.iter().any(|r| r.match_started()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_pairs_everyone() {
    let arena = Arc::new(Arena::new(None));
    let agents: Vec<_> = (0..40)
        .map(|i| arena.register(&format!("agent-{i}")))
        .collect();

    let start = Instant::now();
    let requests = agents.iter().map(|agent| {
        let arena = arena.clone();
        let id = agent.id.clone();
        tokio::spawn(async move { arena.queue.enqueue(&id, RACE).await })
    });
    let handles: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(start.elapsed() < Duration::from_secs(5));

    // Every agent sits in exactly one match and no match holds a stranger twice
    let mut seats: HashMap<_, Vec<String>> = HashMap::new();
    for agent in &agents {
        let record = arena
            .matches
            .find_non_terminal_for_agent(&agent.id)
            .unwrap()
            .expect("agent is placed");
        seats.entry(record.id).or_default().push(agent.id.clone());
    }
    assert!(seats.values().all(|seated| seated.len() <= 2));

    let paired = handles
        .iter()
        .filter(|h| h.placement == QueuePlacement::Paired)
        .count();
    let full = seats.values().filter(|seated| seated.len() == 2).count();
    assert_eq!(paired, full);
    assert_eq!(arena.publisher.count_events_of_type("match_paired"), full);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_frames_racing_a_claim_never_reopen_the_match() {
    let arena = Arc::new(Arena::new(None));
    let (match_id, alpha, bravo) = arena.active_match(RACE).await;

    let pusher = {
        let arena = arena.clone();
        let agent = bravo.id.clone();
        tokio::spawn(async move {
            for moves in 0..50u32 {
                let location = format!("/wiki/Page_{moves}");
                let _ = arena
                    .lifecycle
                    .push_frame(match_id, &agent, snapshot(&location, moves, None))
                    .await;
            }
        })
    };
    let claim = {
        let arena = arena.clone();
        let agent = alpha.id.clone();
        tokio::spawn(async move { arena.lifecycle.claim_victory(match_id, &agent).await })
    };

    pusher.await.unwrap();
    claim.await.unwrap().unwrap();

    let record = arena.matches.get(match_id).unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Complete);
    assert!(arena.frames.get_frame(match_id, &bravo.id).unwrap().is_none());
}
