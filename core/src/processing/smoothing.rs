//! Per-track exponential smoothing of position and speed.
//!
//! `smoothed = α·raw + (1-α)·previous_smoothed`, with α taken from
//! [`SmoothingConfig::alpha`]. The first sample of a track seeds the filter
//! unchanged. State lives on the track, so concurrent tracks never share
//! history.

use crate::math::kinematics::KinematicsHelper;
use crate::prelude::SmoothingConfig;
use crate::wire::detection::{RawDetectionSlot, SmoothedSample};
use crate::wire::timestamp::{elapsed_secs, Timestamp};

#[derive(Debug, Clone, Default)]
pub struct FilterState {
    last: Option<SmoothedSample>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&SmoothedSample> {
        self.last.as_ref()
    }

    pub fn apply(
        &mut self,
        slot: &RawDetectionSlot,
        captured_at: Timestamp,
        config: &SmoothingConfig,
    ) -> SmoothedSample {
        let (raw_x, raw_y) = slot.position();
        let raw_speed = slot.speed_mm_s as f64;

        let sample = match self.last {
            None => SmoothedSample {
                captured_at,
                x_mm: raw_x,
                y_mm: raw_y,
                range_mm: KinematicsHelper::range(raw_x, raw_y),
                speed_mm_s: raw_speed,
                accel_mm_s2: 0.0,
            },
            Some(previous) => {
                let alpha = config.alpha();
                let x_mm = KinematicsHelper::blend(alpha, raw_x, previous.x_mm);
                let y_mm = KinematicsHelper::blend(alpha, raw_y, previous.y_mm);
                let speed_mm_s = KinematicsHelper::blend(alpha, raw_speed, previous.speed_mm_s);
                let accel_mm_s2 = KinematicsHelper::acceleration(
                    previous.speed_mm_s,
                    speed_mm_s,
                    elapsed_secs(&previous.captured_at, &captured_at),
                );
                SmoothedSample {
                    captured_at,
                    x_mm,
                    y_mm,
                    range_mm: KinematicsHelper::range(x_mm, y_mm),
                    speed_mm_s,
                    accel_mm_s2,
                }
            }
        };

        self.last = Some(sample);
        sample
    }
}
