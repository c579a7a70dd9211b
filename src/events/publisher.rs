//! Event publishing for match lifecycle and telemetry events
//!
//! Delivery is in-process and at-most-once: a subscriber that falls behind
//! skips ahead, and nothing is replayed after a reconnect. Spectators
//! reconcile through a full match read.

use crate::error::{ArenaError, Result};
use crate::types::{ArenaEvent, MatchId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Trait for publishing arena events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the match's channel
    async fn publish(&self, event: ArenaEvent) -> Result<()>;

    /// Drop the match's channel once no further events will follow
    async fn close_match(&self, match_id: MatchId) -> Result<()>;
}

/// Broadcast hub with one channel per match plus a firehose of all events
pub struct BroadcastEventBus {
    channels: RwLock<HashMap<MatchId, broadcast::Sender<ArenaEvent>>>,
    firehose: broadcast::Sender<ArenaEvent>,
    capacity: usize,
}

impl BroadcastEventBus {
    /// Create a new bus; `capacity` bounds each channel's buffer
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity.max(1));
        Self {
            channels: RwLock::new(HashMap::new()),
            firehose,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to one match's events
    pub fn subscribe(&self, match_id: MatchId) -> Result<broadcast::Receiver<ArenaEvent>> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| ArenaError::lock_poisoned("event channels write"))?;

        let sender = channels
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }

    /// Subscribe to every match's events
    pub fn subscribe_all(&self) -> broadcast::Receiver<ArenaEvent> {
        self.firehose.subscribe()
    }

    /// Number of matches with an open channel
    pub fn open_channels(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish(&self, event: ArenaEvent) -> Result<()> {
        let match_id = event.match_id();
        let kind = event.kind();

        let sender = {
            let channels = self
                .channels
                .read()
                .map_err(|_| ArenaError::lock_poisoned("event channels read"))?;
            channels.get(&match_id).cloned()
        };

        // A send error only means nobody is listening right now
        let delivered = match sender {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => 0,
        };
        let _ = self.firehose.send(event);

        debug!(
            "Published {} for match {} to {} subscriber(s)",
            kind, match_id, delivered
        );
        Ok(())
    }

    async fn close_match(&self, match_id: MatchId) -> Result<()> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| ArenaError::lock_poisoned("event channels write"))?;

        if channels.remove(&match_id).is_some() {
            debug!("Closed event channel for match {}", match_id);
        }
        Ok(())
    }
}

/// Mock event publisher for testing
#[derive(Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<ArenaEvent>>,
    closed_matches: std::sync::Mutex<Vec<MatchId>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn get_published_events(&self) -> Vec<ArenaEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Wire names of published events, in order
    pub fn event_kinds(&self) -> Vec<&'static str> {
        self.get_published_events()
            .iter()
            .map(ArenaEvent::kind)
            .collect()
    }

    /// Count events of a given wire name
    pub fn count_events_of_type(&self, kind: &str) -> usize {
        self.event_kinds().iter().filter(|k| **k == kind).count()
    }

    pub fn closed_matches(&self) -> Vec<MatchId> {
        self.closed_matches
            .lock()
            .map(|closed| closed.clone())
            .unwrap_or_default()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: ArenaEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
        Ok(())
    }

    async fn close_match(&self, match_id: MatchId) -> Result<()> {
        if let Ok(mut closed) = self.closed_matches.lock() {
            closed.push(match_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JudgingStarted, MatchTimeout};
    use crate::utils::{current_timestamp, generate_match_id};
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn judging(match_id: MatchId) -> ArenaEvent {
        ArenaEvent::JudgingStarted(JudgingStarted {
            match_id,
            claimed_by: "a1".to_string(),
            timestamp: current_timestamp(),
        })
    }

    #[tokio::test]
    async fn test_events_reach_only_their_match() {
        let bus = BroadcastEventBus::new(16);
        let watched = generate_match_id();
        let other = generate_match_id();
        let mut rx = bus.subscribe(watched).unwrap();

        bus.publish(judging(other)).await.unwrap();
        bus.publish(judging(watched)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.match_id(), watched);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(16);
        assert!(bus.publish(judging(generate_match_id())).await.is_ok());
        assert_eq!(bus.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let bus = BroadcastEventBus::new(2);
        let match_id = generate_match_id();
        let mut rx = bus.subscribe(match_id).unwrap();

        for _ in 0..5 {
            bus.publish(judging(match_id)).await.unwrap();
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_match_ends_subscription() {
        let bus = BroadcastEventBus::new(16);
        let match_id = generate_match_id();
        let mut rx = bus.subscribe(match_id).unwrap();

        bus.publish(ArenaEvent::MatchTimeout(MatchTimeout {
            match_id,
            ended_at: current_timestamp(),
            timestamp: current_timestamp(),
        }))
        .await
        .unwrap();
        bus.close_match(match_id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "match_timeout");
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_firehose_sees_every_match() {
        let bus = BroadcastEventBus::new(16);
        let mut all = bus.subscribe_all();

        bus.publish(judging(generate_match_id())).await.unwrap();
        bus.publish(judging(generate_match_id())).await.unwrap();

        assert!(all.recv().await.is_ok());
        assert!(all.recv().await.is_ok());
    }
}
