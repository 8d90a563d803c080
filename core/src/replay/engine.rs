//! Re-injects a logged track through decode, gating and smoothing at a
//! chosen speed.
//!
//! Only the followed track's own filter is replayed. Each row's frame is
//! re-decoded and the slot inside the gate around the track's last smoothed
//! position that reproduces the logged row is folded into that filter, so
//! other people sharing the frames never change the outcome.
//!
//! Emission of row `i` is scheduled `(t[i] - t[anchor]) / speed` after the
//! anchor instant, so pacing does not drift with processing time. The anchor
//! is reset whenever playback resumes, seeks or changes speed.

use crate::math::kinematics::KinematicsHelper;
use crate::prelude::{ReplayError, TrackerConfig};
use crate::processing::smoothing::FilterState;
use crate::storage::detail::DetailLogRow;
use crate::telemetry::log::LogManager;
use crate::wire::detection::{DetectionBatch, SmoothedSample};
use crate::wire::frame::decode_hex_frame;
use crate::wire::timestamp::Timestamp;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const MIN_SPEED: f64 = 1.0;
pub const MAX_SPEED: f64 = 20.0;

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct ControlState {
    paused: AtomicBool,
    cancelled: AtomicBool,
    speed_milli: AtomicU64,
    position: AtomicUsize,
    seek_to: Mutex<Option<usize>>,
}

/// Thread-safe handle for steering a running replay.
#[derive(Clone)]
pub struct ReplayControl {
    state: Arc<ControlState>,
}

impl ReplayControl {
    fn new(speed: f64) -> Self {
        let control = Self {
            state: Arc::new(ControlState::default()),
        };
        control.set_speed(speed);
        control
    }

    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    /// Rewinds to the first row and pauses.
    pub fn stop(&self) {
        self.seek(0);
        self.pause();
    }

    /// Ends `run` at the next scheduling point.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    /// The next emitted row will be `row`.
    pub fn seek(&self, row: usize) {
        if let Ok(mut seek) = self.state.seek_to.lock() {
            *seek = Some(row);
        }
    }

    /// Clamped to `MIN_SPEED..=MAX_SPEED`.
    pub fn set_speed(&self, speed: f64) {
        let speed = if speed.is_finite() {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            MIN_SPEED
        };
        self.state
            .speed_milli
            .store((speed * 1000.0).round() as u64, Ordering::SeqCst);
    }

    pub fn speed(&self) -> f64 {
        self.state.speed_milli.load(Ordering::SeqCst) as f64 / 1000.0
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Index of the next row to emit.
    pub fn position(&self) -> usize {
        self.state.position.load(Ordering::SeqCst)
    }

    fn take_seek(&self) -> Option<usize> {
        self.state.seek_to.lock().ok().and_then(|mut seek| seek.take())
    }
}

/// One replayed row after re-decoding and re-smoothing.
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    pub index: usize,
    pub logged: DetailLogRow,
    pub replayed: SmoothedSample,
    /// Radar slot the track occupied in this frame.
    pub slot: u8,
    /// Largest absolute difference between logged and replayed fields.
    pub deviation: f64,
}

#[derive(Clone, Copy)]
struct Anchor {
    instant: Instant,
    timestamp: Timestamp,
    speed: f64,
}

pub struct ReplayEngine {
    rows: Vec<DetailLogRow>,
    config: TrackerConfig,
    filter: FilterState,
    cursor: usize,
    control: ReplayControl,
    logger: LogManager,
}

impl ReplayEngine {
    /// `config` must match the configuration the rows were logged with.
    pub fn new(rows: Vec<DetailLogRow>, config: TrackerConfig, speed: f64) -> Result<Self, ReplayError> {
        if rows.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(Self {
            rows,
            config,
            filter: FilterState::new(),
            cursor: 0,
            control: ReplayControl::new(speed),
            logger: LogManager::new("radarcore::replay"),
        })
    }

    pub fn control(&self) -> ReplayControl {
        self.control.clone()
    }

    /// Wall-clock wait before row `index` relative to the previous row at
    /// `speed`. Never negative.
    pub fn delay_before(&self, index: usize, speed: f64) -> Duration {
        if index == 0 || index >= self.rows.len() {
            return Duration::ZERO;
        }
        let gap_ms = (self.rows[index].timestamp - self.rows[index - 1].timestamp)
            .num_milliseconds()
            .max(0);
        scaled(gap_ms, speed)
    }

    /// Emits the next row immediately, without pacing.
    pub fn step(&mut self) -> Result<Option<ReplayFrame>, ReplayError> {
        let index = self.cursor;
        let Some(logged) = self.rows.get(index).cloned() else {
            return Ok(None);
        };
        let batch = decode_hex_frame(&logged.raw_hex, logged.timestamp)
            .map_err(|source| ReplayError::Frame { row: index, source })?;
        let (slot, replayed) = self.follow(index, &logged, &batch)?;

        self.cursor += 1;
        self.control.state.position.store(self.cursor, Ordering::SeqCst);
        Ok(Some(ReplayFrame {
            index,
            deviation: deviation(&logged, &replayed),
            logged,
            replayed,
            slot,
        }))
    }

    /// Positions the engine so `row` is emitted next. Filter state is rebuilt
    /// by silently re-processing the preceding rows, so filter continuity
    /// and ordering hold after the jump.
    pub fn seek(&mut self, row: usize) -> Result<(), ReplayError> {
        let row = row.min(self.rows.len());
        self.filter = FilterState::new();
        self.cursor = 0;
        while self.cursor < row {
            self.step()?;
        }
        self.control.state.position.store(self.cursor, Ordering::SeqCst);
        self.logger.detail(&format!("seeked to row {row}"));
        Ok(())
    }

    /// Paced playback honouring pause, resume, seek, speed changes and
    /// cancellation. Returns the number of rows emitted.
    pub fn run(&mut self, mut sink: impl FnMut(&ReplayFrame)) -> Result<usize, ReplayError> {
        let mut emitted = 0;
        let mut anchor: Option<Anchor> = None;
        let mut emit_now = true;

        loop {
            if self.control.is_cancelled() {
                break;
            }
            if let Some(row) = self.control.take_seek() {
                self.seek(row)?;
                anchor = None;
                emit_now = true;
            }
            if self.control.is_paused() {
                anchor = None;
                thread::sleep(IDLE_POLL);
                continue;
            }
            let Some(next) = self.rows.get(self.cursor) else {
                break;
            };

            let speed = self.control.speed();
            let current = match anchor {
                Some(a) if a.speed == speed => a,
                _ => {
                    let timestamp = match (emit_now, self.cursor.checked_sub(1)) {
                        (false, Some(prev)) => self.rows[prev].timestamp,
                        _ => next.timestamp,
                    };
                    let a = Anchor {
                        instant: Instant::now(),
                        timestamp,
                        speed,
                    };
                    anchor = Some(a);
                    a
                }
            };
            let offset_ms = (next.timestamp - current.timestamp).num_milliseconds().max(0);
            let due = current.instant + scaled(offset_ms, speed);
            let now = Instant::now();
            if due > now {
                thread::sleep((due - now).min(IDLE_POLL));
                continue;
            }

            if let Some(frame) = self.step()? {
                sink(&frame);
                emitted += 1;
                emit_now = false;
            }
        }
        self.logger
            .record(&format!("replay emitted {emitted} of {} rows", self.rows.len()));
        Ok(emitted)
    }

    /// Advances the track's filter with the slot that reproduces `logged`.
    ///
    /// Candidates are the slots within the gating radius of the last smoothed
    /// position, or of the logged position on the birth row. Ties go to the
    /// nearer slot, then the lower channel. A frame with no candidate means
    /// the log and the configuration disagree about this track.
    fn follow(
        &mut self,
        index: usize,
        logged: &DetailLogRow,
        batch: &DetectionBatch,
    ) -> Result<(u8, SmoothedSample), ReplayError> {
        let anchor = self
            .filter
            .last()
            .map(|s| (s.x_mm, s.y_mm))
            .unwrap_or((logged.x_mm, logged.y_mm));
        let smoothing = self.config.smoothing;

        let best = batch
            .slots
            .iter()
            .map(|slot| (slot, KinematicsHelper::distance(anchor, slot.position())))
            .filter(|(_, gap)| *gap <= self.config.gating_radius_mm)
            .map(|(slot, gap)| {
                let mut trial = self.filter.clone();
                let sample = trial.apply(slot, batch.captured_at, &smoothing);
                (deviation(logged, &sample), gap, slot.slot, trial, sample)
            })
            .min_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.total_cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            });

        let (_, _, slot, filter, sample) = best.ok_or(ReplayError::TargetLost { row: index })?;
        self.filter = filter;
        Ok((slot, sample))
    }
}

fn scaled(gap_ms: i64, speed: f64) -> Duration {
    let speed = speed.clamp(MIN_SPEED, MAX_SPEED);
    Duration::from_secs_f64(gap_ms.max(0) as f64 / 1000.0 / speed)
}

fn deviation(row: &DetailLogRow, sample: &SmoothedSample) -> f64 {
    [
        row.x_mm - sample.x_mm,
        row.y_mm - sample.y_mm,
        row.range_mm - sample.range_mm,
        row.speed_mm_s - sample.speed_mm_s,
        row.accel_mm_s2 - sample.accel_mm_s2,
    ]
    .iter()
    .fold(0.0, |acc, d| acc.max(d.abs()))
}
