use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// Lightest and heaviest accepted smoothing levels.
pub const MIN_SMOOTHING_LEVEL: u8 = 1;
pub const MAX_SMOOTHING_LEVEL: u8 = 10;

/// Smoothing parameters handed to every per-track filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub level: u8,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 5,
        }
    }
}

impl SmoothingConfig {
    pub fn new(enabled: bool, level: u8) -> Self {
        Self { enabled, level }
    }

    /// Equivalent rolling-average window in frames: level 1 -> 3 frames,
    /// level 10 -> 50 frames.
    pub fn window(&self) -> usize {
        if !self.enabled {
            return 1;
        }
        let level = self.level.clamp(MIN_SMOOTHING_LEVEL, MAX_SMOOTHING_LEVEL) as f64;
        3 + ((level - 1.0) * 47.0 / 9.0).round() as usize
    }

    /// Exponential weight given to a fresh raw value. Decreases strictly
    /// with the level; 1.0 when smoothing is disabled.
    pub fn alpha(&self) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        2.0 / (self.window() as f64 + 1.0)
    }
}

/// Track manager parameters. Installation dependent, never hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub gating_radius_mm: f64,
    pub stale_timeout_ms: u64,
    pub smoothing: SmoothingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gating_radius_mm: 800.0,
            stale_timeout_ms: 3_000,
            smoothing: SmoothingConfig::default(),
        }
    }
}

/// Malformed wire bytes. Recoverable: the batch is skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad frame length: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("bad frame header: {found}")]
    BadHeader { found: String },
    #[error("bad frame footer: {found}")]
    BadFooter { found: String },
    #[error("value {value} does not fit a 15-bit sign-magnitude field")]
    ValueOutOfRange { value: i32 },
    #[error("slot index {0} outside 0..3")]
    BadSlot(u8),
    #[error("invalid hex payload: {0}")]
    BadHex(String),
}

/// Port or connection failure. Fatal to the adapter instance.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("transport read failed: {0}")]
    Io(#[from] io::Error),
    #[error("transport disconnected: {0}")]
    Disconnected(String),
    #[error("end of stream")]
    EndOfStream,
}

/// Logic fault inside the track manager. The offending detection is dropped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingInconsistency {
    #[error("serial T{0} is already assigned to an open track")]
    DuplicateSerial(u64),
}

/// Log writer failure. Surfaced to the caller; track state stays in memory.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("log io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("log csv failure on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("no open detail log for T{0}")]
    UnknownTrack(u64),
    #[error("corrupt log {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Replay could not reconstruct the logged track.
#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("detail log is empty")]
    Empty,
    #[error("row {row}: {source}")]
    Frame {
        row: usize,
        #[source]
        source: FrameError,
    },
    #[error("row {row}: logged target not found in replayed frame")]
    TargetLost { row: usize },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type FrameResult<T> = Result<T, FrameError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_spans_three_to_fifty_frames() {
        assert_eq!(SmoothingConfig::new(true, 1).window(), 3);
        assert_eq!(SmoothingConfig::new(true, 10).window(), 50);
        assert_eq!(SmoothingConfig::new(false, 10).window(), 1);
    }

    #[test]
    fn alpha_decreases_strictly_with_level() {
        let alphas: Vec<f64> = (1..=10)
            .map(|level| SmoothingConfig::new(true, level).alpha())
            .collect();
        assert!(alphas.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(SmoothingConfig::new(false, 7).alpha(), 1.0);
    }
}
