//! Live frame store and spectator fan-out
//!
//! Frames live in a process-scoped map keyed by (match, agent). Writes are
//! last-write-wins; there is no sequence check because spectators only care
//! about the latest snapshot and the history is only read by the oracle after
//! the timed window closed. Clearing a match also closes it, so a frame that
//! raced the end of the window cannot recreate its stream. Closed markers are
//! only kept for a retention window, long enough to outlive any request that
//! read the match while it was still active. A restart drops everything held
//! here.

use crate::error::{ArenaError, Result};
use crate::events::EventPublisher;
use crate::types::{AgentId, ArenaEvent, Frame, FrameEvent, MatchId, Snapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone)]
struct FrameRecord {
    latest: Option<Frame>,
    history: Vec<Frame>,
}

/// Latest snapshots of both participants of a match
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MatchFrames {
    pub agent_a: Option<Frame>,
    pub agent_b: Option<Frame>,
}

#[derive(Debug, Default)]
struct FrameTable {
    streams: HashMap<(MatchId, AgentId), FrameRecord>,
    /// Matches refusing frames, with the instant they were closed
    closed: HashMap<MatchId, Instant>,
}

/// How long a cleared match keeps refusing late frames
pub const DEFAULT_CLOSED_RETENTION: Duration = Duration::from_secs(600);

/// Ephemeral frame store with broadcast on every write
pub struct FrameStore {
    records: RwLock<FrameTable>,
    publisher: Arc<dyn EventPublisher>,
    closed_retention: Duration,
}

impl FrameStore {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            records: RwLock::new(FrameTable::default()),
            publisher,
            closed_retention: DEFAULT_CLOSED_RETENTION,
        }
    }

    pub fn with_closed_retention(mut self, retention: Duration) -> Self {
        self.closed_retention = retention;
        self
    }

    /// Store a snapshot and fan it out to the match's subscribers.
    ///
    /// Returns the frame as stored, with repeated reasoning removed.
    pub async fn store_frame(
        &self,
        match_id: MatchId,
        agent_id: &str,
        snapshot: Snapshot,
    ) -> Result<Frame> {
        let frame = {
            let mut records = self
                .records
                .write()
                .map_err(|_| ArenaError::lock_poisoned("frames write"))?;

            if records.closed.contains_key(&match_id) {
                return Err(ArenaError::Validation {
                    reason: "Match is not active".to_string(),
                }
                .into());
            }

            let record = records
                .streams
                .entry((match_id, agent_id.to_string()))
                .or_default();

            let reasoning = snapshot
                .reasoning
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            // Only a repeat of the immediately preceding frame's reasoning is dropped
            let previous = record.history.last().and_then(|f| f.reasoning.as_deref());
            let reasoning = reasoning.filter(|text| previous != Some(text.as_str()));

            let frame = Frame {
                agent_id: agent_id.to_string(),
                image: snapshot.image,
                location: snapshot.location,
                move_count: snapshot.move_count,
                reasoning,
                timestamp_ms: Utc::now().timestamp_millis(),
            };

            record.history.push(frame.clone());
            record.latest = Some(frame.clone());
            frame
        };

        let event = ArenaEvent::Frame(FrameEvent {
            match_id,
            frame: frame.clone(),
        });
        if let Err(e) = self.publisher.publish(event).await {
            // Spectators reconcile with a full read; the frame itself is stored
            warn!("Failed to broadcast frame for match {}: {}", match_id, e);
        }

        Ok(frame)
    }

    /// Latest snapshot of one participant
    pub fn get_frame(&self, match_id: MatchId, agent_id: &str) -> Result<Option<Frame>> {
        let records = self
            .records
            .read()
            .map_err(|_| ArenaError::lock_poisoned("frames read"))?;

        Ok(records
            .streams
            .get(&(match_id, agent_id.to_string()))
            .and_then(|record| record.latest.clone()))
    }

    /// Every snapshot a participant pushed, oldest first
    pub fn get_frame_history(&self, match_id: MatchId, agent_id: &str) -> Result<Vec<Frame>> {
        let records = self
            .records
            .read()
            .map_err(|_| ArenaError::lock_poisoned("frames read"))?;

        Ok(records
            .streams
            .get(&(match_id, agent_id.to_string()))
            .map(|record| record.history.clone())
            .unwrap_or_default())
    }

    /// Latest snapshots of both slots
    pub fn get_frames_for_match(
        &self,
        match_id: MatchId,
        agent_a: Option<&str>,
        agent_b: Option<&str>,
    ) -> Result<MatchFrames> {
        let agent_a = match agent_a {
            Some(id) => self.get_frame(match_id, id)?,
            None => None,
        };
        let agent_b = match agent_b {
            Some(id) => self.get_frame(match_id, id)?,
            None => None,
        };
        Ok(MatchFrames { agent_a, agent_b })
    }

    /// Drop latest snapshots and history of every participant of a match
    /// and refuse further frames for it
    pub fn clear_match_frames(&self, match_id: MatchId) -> Result<usize> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ArenaError::lock_poisoned("frames write"))?;

        let before = records.streams.len();
        records.streams.retain(|(id, _), _| *id != match_id);
        let removed = before - records.streams.len();

        let now = Instant::now();
        let retention = self.closed_retention;
        records
            .closed
            .retain(|_, closed_at| now.duration_since(*closed_at) < retention);
        records.closed.insert(match_id, now);

        debug!("Cleared {} frame record(s) for match {}", removed, match_id);
        Ok(removed)
    }

    /// Number of (match, agent) pairs currently held
    pub fn tracked_streams(&self) -> usize {
        self.records.read().map(|r| r.streams.len()).unwrap_or(0)
    }

    /// Number of cleared matches still refusing frames
    pub fn closed_matches(&self) -> usize {
        self.records.read().map(|r| r.closed.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MockEventPublisher;
    use crate::utils::generate_match_id;

    fn snapshot(location: &str, moves: u32, reasoning: Option<&str>) -> Snapshot {
        Snapshot {
            image: "aW1n".to_string(),
            location: location.to_string(),
            move_count: moves,
            reasoning: reasoning.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_store_keeps_latest_and_history() {
        let publisher = Arc::new(MockEventPublisher::new());
        let store = FrameStore::new(publisher.clone());
        let match_id = generate_match_id();

        store
            .store_frame(match_id, "a1", snapshot("/wiki/Science", 0, None))
            .await
            .unwrap();
        store
            .store_frame(match_id, "a1", snapshot("/wiki/Physics", 1, None))
            .await
            .unwrap();

        let latest = store.get_frame(match_id, "a1").unwrap().unwrap();
        assert_eq!(latest.location, "/wiki/Physics");
        assert_eq!(store.get_frame_history(match_id, "a1").unwrap().len(), 2);
        assert_eq!(publisher.count_events_of_type("frame"), 2);
    }

    #[tokio::test]
    async fn test_repeated_reasoning_is_dropped() {
        let store = FrameStore::new(Arc::new(MockEventPublisher::new()));
        let match_id = generate_match_id();

        let first = store
            .store_frame(match_id, "a1", snapshot("/wiki/A", 0, Some("thinking")))
            .await
            .unwrap();
        let repeat = store
            .store_frame(match_id, "a1", snapshot("/wiki/A", 0, Some(" thinking ")))
            .await
            .unwrap();
        let fresh = store
            .store_frame(match_id, "a1", snapshot("/wiki/B", 1, Some("follow link")))
            .await
            .unwrap();

        assert_eq!(first.reasoning.as_deref(), Some("thinking"));
        assert_eq!(repeat.reasoning, None);
        assert_eq!(fresh.reasoning.as_deref(), Some("follow link"));
    }

    #[tokio::test]
    async fn test_reasoning_after_a_silent_frame_is_kept() {
        let store = FrameStore::new(Arc::new(MockEventPublisher::new()));
        let match_id = generate_match_id();

        let thoughts = [Some("A"), None, Some("A"), Some("A")];
        let mut kept = Vec::new();
        for (moves, thought) in thoughts.into_iter().enumerate() {
            let frame = store
                .store_frame(match_id, "a1", snapshot("/wiki/A", moves as u32, thought))
                .await
                .unwrap();
            kept.push(frame.reasoning);
        }

        assert_eq!(
            kept,
            vec![Some("A".to_string()), None, Some("A".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_clear_removes_only_that_match() {
        let store = FrameStore::new(Arc::new(MockEventPublisher::new()));
        let finished = generate_match_id();
        let running = generate_match_id();

        store
            .store_frame(finished, "a1", snapshot("/wiki/A", 0, None))
            .await
            .unwrap();
        store
            .store_frame(finished, "b1", snapshot("/wiki/A", 0, None))
            .await
            .unwrap();
        store
            .store_frame(running, "c1", snapshot("/wiki/A", 0, None))
            .await
            .unwrap();

        assert_eq!(store.clear_match_frames(finished).unwrap(), 2);
        assert!(store.get_frame(finished, "a1").unwrap().is_none());
        assert!(store.get_frame_history(finished, "b1").unwrap().is_empty());
        assert!(store.get_frame(running, "c1").unwrap().is_some());

        let late = store
            .store_frame(finished, "a1", snapshot("/wiki/B", 1, None))
            .await;
        assert!(late.is_err());
        assert_eq!(store.tracked_streams(), 1);
    }

    #[tokio::test]
    async fn test_closed_markers_expire_after_retention() {
        let store = FrameStore::new(Arc::new(MockEventPublisher::new()))
            .with_closed_retention(Duration::ZERO);

        for _ in 0..100 {
            store.clear_match_frames(generate_match_id()).unwrap();
        }
        assert_eq!(store.closed_matches(), 1);

        let kept = FrameStore::new(Arc::new(MockEventPublisher::new()));
        for _ in 0..3 {
            kept.clear_match_frames(generate_match_id()).unwrap();
        }
        assert_eq!(kept.closed_matches(), 3);
    }

    #[tokio::test]
    async fn test_frames_for_match_reports_both_slots() {
        let store = FrameStore::new(Arc::new(MockEventPublisher::new()));
        let match_id = generate_match_id();

        store
            .store_frame(match_id, "a1", snapshot("/wiki/A", 0, None))
            .await
            .unwrap();

        let frames = store
            .get_frames_for_match(match_id, Some("a1"), Some("b1"))
            .unwrap();
        assert!(frames.agent_a.is_some());
        assert!(frames.agent_b.is_none());
    }
}
