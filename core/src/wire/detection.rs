use crate::prelude::FrameError;
use crate::wire::frame::FRAME_LEN;
use crate::wire::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};

/// One hardware reporting channel of a frame. The slot index is a channel
/// number, never a track identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDetectionSlot {
    pub slot: u8,
    pub x_mm: i32,
    pub y_mm: i32,
    pub speed_mm_s: i32,
    pub resolution_mm: u16,
}

impl RawDetectionSlot {
    pub fn new(slot: u8, x_mm: i32, y_mm: i32, speed_mm_s: i32, resolution_mm: u16) -> Self {
        Self {
            slot,
            x_mm,
            y_mm,
            speed_mm_s,
            resolution_mm,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x_mm as f64, self.y_mm as f64)
    }
}

/// Decoded content of one wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionBatch {
    pub captured_at: Timestamp,
    /// Active slots in slot order, at most three.
    pub slots: Vec<RawDetectionSlot>,
    pub raw: [u8; FRAME_LEN],
}

impl DetectionBatch {
    pub fn raw_hex(&self) -> String {
        hex::encode(self.raw)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A slot's fields after filtering, with derived range and acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSample {
    #[serde(with = "timestamp::iso_millis")]
    pub captured_at: Timestamp,
    pub x_mm: f64,
    pub y_mm: f64,
    pub range_mm: f64,
    pub speed_mm_s: f64,
    pub accel_mm_s2: f64,
}

/// What a transport adapter hands to the consumer path.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Batch(DetectionBatch),
    /// A frame-sized window failed to decode. Counts as a missed detection.
    Rejected {
        captured_at: Timestamp,
        error: FrameError,
    },
}

impl Ingest {
    pub fn captured_at(&self) -> Timestamp {
        match self {
            Ingest::Batch(batch) => batch.captured_at,
            Ingest::Rejected { captured_at, .. } => *captured_at,
        }
    }
}
