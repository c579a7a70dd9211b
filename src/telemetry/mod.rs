//! Live telemetry channel: per-agent snapshots pushed during the timed window

pub mod frames;

pub use frames::{FrameStore, MatchFrames};
