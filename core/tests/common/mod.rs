#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use radarcore::prelude::{SmoothingConfig, TrackerConfig};
use radarcore::wire::{decode_frame, encode_frame, Ingest, RawDetectionSlot, Timestamp};

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn at(ms: i64) -> Timestamp {
    day().and_hms_opt(14, 30, 0).unwrap() + Duration::milliseconds(ms)
}

pub fn config() -> TrackerConfig {
    TrackerConfig {
        gating_radius_mm: 500.0,
        stale_timeout_ms: 3_000,
        smoothing: SmoothingConfig::new(true, 5),
    }
}

/// `(channel, x, y, speed)` per present target.
pub fn ingest(ms: i64, targets: &[(u8, i32, i32, i32)]) -> Ingest {
    let slots: Vec<RawDetectionSlot> = targets
        .iter()
        .map(|&(ch, x, y, v)| RawDetectionSlot::new(ch, x, y, v, 360))
        .collect();
    let frame = encode_frame(&slots).unwrap();
    Ingest::Batch(decode_frame(&frame, at(ms)).unwrap())
}
