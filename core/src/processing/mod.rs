pub mod association;
pub mod handoff;
pub mod smoothing;
pub mod tracking;

pub use association::{associate, AssignEdge, Assignment};
pub use handoff::HandoffQueue;
pub use smoothing::FilterState;
pub use tracking::{Track, TrackEvent, TrackId, TrackManager, TrackStatus, TrackSummary};
