//! Core processing for the LD2450 mmWave radar logger.
//!
//! Frames arrive from a serial line or a message bus, are decoded into
//! detection batches, smoothed and associated into tracks on a single
//! consumer, and persisted as per-day CSV logs that can be replayed
//! deterministically.

pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod replay;
pub mod storage;
pub mod telemetry;
pub mod transport;
pub mod wire;

pub use pipeline::{Pipeline, PipelineSnapshot, TrackView};
pub use prelude::{SmoothingConfig, TrackerConfig};
pub use processing::{HandoffQueue, TrackEvent, TrackId, TrackManager};
pub use wire::{DetectionBatch, Ingest};
