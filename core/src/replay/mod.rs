pub mod engine;
pub mod verify;

pub use engine::{ReplayControl, ReplayEngine, ReplayFrame, MAX_SPEED, MIN_SPEED};
pub use verify::{verify_detail_file, verify_replay, ReplayReport};
