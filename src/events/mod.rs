//! Real-time event bus for match lifecycle and telemetry events

pub mod publisher;

pub use publisher::{BroadcastEventBus, EventPublisher, MockEventPublisher};
