use crate::generator::template::WalkTemplate;
use anyhow::Context;
use chrono::Duration as ChronoDuration;
use radarcore::wire::detection::RawDetectionSlot;
use radarcore::wire::{encode_frame, Timestamp, FRAME_LEN};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// LD2450 reports at roughly 10 Hz.
const DEFAULT_INTERVAL_MS: u64 = 100;
const MAX_TARGETS: usize = 3;
const RESOLUTION_MM: u16 = 360;

/// Configuration for generating synthetic LD2450 traffic.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub frames: usize,
    pub frame_interval_ms: u64,
    pub walkers: usize,
    pub noise_mm: f64,
    /// Probability that a frame arrives with a corrupted footer.
    pub corruption: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            frames: 300,
            frame_interval_ms: DEFAULT_INTERVAL_MS,
            walkers: 4,
            noise_mm: 15.0,
            corruption: 0.02,
            seed: 0,
        }
    }
}

/// One frame as it would arrive on the wire.
#[derive(Debug, Clone)]
pub struct GeneratedFrame {
    pub captured_at: Timestamp,
    pub bytes: [u8; FRAME_LEN],
}

/// Walkers enter during the first three quarters of the run.
fn build_walks(config: &GeneratorConfig, rng: &mut StdRng) -> Vec<WalkTemplate> {
    let span_ms = config.frames as u64 * config.frame_interval_ms;
    let latest_entry = (span_ms * 3 / 4).max(1);
    (0..config.walkers)
        .map(|_| {
            let enter_ms = rng.gen_range(0..latest_entry);
            let duration_ms = rng.gen_range(2_000..8_000);
            let from_left = rng.gen_bool(0.5);
            let start_x = if from_left { -2500.0 } else { 2500.0 };
            let speed = rng.gen_range(150.0..500.0);
            WalkTemplate {
                start_mm: (start_x, rng.gen_range(800.0..5000.0)),
                velocity_mm_s: (
                    if from_left { speed } else { -speed },
                    rng.gen_range(-150.0..150.0),
                ),
                enter_ms,
                exit_ms: enter_ms + duration_ms,
            }
        })
        .collect()
}

pub fn build_frames(config: &GeneratorConfig, start: Timestamp) -> anyhow::Result<Vec<GeneratedFrame>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let walks = build_walks(config, &mut rng);
    let mut frames = Vec::with_capacity(config.frames);

    for index in 0..config.frames {
        let t_ms = index as u64 * config.frame_interval_ms;
        let mut slots = Vec::with_capacity(MAX_TARGETS);
        for walk in walks.iter().filter(|w| w.is_visible(t_ms)).take(MAX_TARGETS) {
            let (Some((x, y)), Some(speed)) = (walk.position_at(t_ms), walk.radial_speed_at(t_ms)) else {
                continue;
            };
            let jitter = config.noise_mm.abs();
            let dx = if jitter > 0.0 { rng.gen_range(-jitter..jitter) } else { 0.0 };
            let dy = if jitter > 0.0 { rng.gen_range(-jitter..jitter) } else { 0.0 };
            // y stays positive so no target ever encodes as the absent sentinel
            slots.push(RawDetectionSlot::new(
                slots.len() as u8,
                (x + dx).round() as i32,
                (y + dy).round().max(1.0) as i32,
                speed.round() as i32,
                RESOLUTION_MM,
            ));
        }

        let mut bytes = encode_frame(&slots)
            .with_context(|| format!("encoding synthetic frame {index}"))?;
        if config.corruption > 0.0 && rng.gen_bool(config.corruption.min(1.0)) {
            bytes[FRAME_LEN - 1] ^= 0xff;
        }
        frames.push(GeneratedFrame {
            captured_at: start + ChronoDuration::milliseconds(t_ms as i64),
            bytes,
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use radarcore::wire::decode_frame;

    fn start() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn generator_builds_expected_frame_count() {
        let config = GeneratorConfig {
            frames: 50,
            corruption: 0.0,
            ..Default::default()
        };
        let frames = build_frames(&config, start()).unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[1].captured_at - frames[0].captured_at, ChronoDuration::milliseconds(100));
        for frame in &frames {
            assert!(decode_frame(&frame.bytes, frame.captured_at).is_ok());
        }
    }

    #[test]
    fn same_seed_repeats_traffic() {
        let config = GeneratorConfig {
            frames: 40,
            seed: 13,
            ..Default::default()
        };
        let a = build_frames(&config, start()).unwrap();
        let b = build_frames(&config, start()).unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| x.bytes == y.bytes));
    }

    #[test]
    fn full_corruption_breaks_every_footer() {
        let config = GeneratorConfig {
            frames: 10,
            corruption: 1.0,
            ..Default::default()
        };
        let frames = build_frames(&config, start()).unwrap();
        assert!(frames
            .iter()
            .all(|f| decode_frame(&f.bytes, f.captured_at).is_err()));
    }
}
