//! Consumer path: smoothing, tracking and logging of ingested frames.
//!
//! Exactly one `Pipeline` owns the track state, so tracks need no locking.
//! Log appends run synchronously on this path, in processing order. A write
//! that fails stays queued and is retried on every later item and on
//! shutdown, ahead of newer writes for the same track.

use crate::prelude::{PersistenceError, PersistenceResult, TrackerConfig};
use crate::processing::handoff::HandoffQueue;
use crate::processing::tracking::{TrackEvent, TrackId, TrackManager, TrackStatus, TrackSummary};
use crate::storage::writer::LogWriter;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::wire::detection::{Ingest, SmoothedSample};
use crate::wire::timestamp::{self, capture_now, Timestamp};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RECENT_CLOSED: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Queued sample rows beyond this are discarded oldest first; opens and
/// closes are always kept.
const BACKLOG_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
enum PendingWrite {
    Open { id: TrackId, first_seen: Timestamp },
    Sample { id: TrackId, sample: SmoothedSample, raw_hex: String },
    Close(TrackSummary),
}

impl PendingWrite {
    fn track(&self) -> TrackId {
        match self {
            PendingWrite::Open { id, .. } | PendingWrite::Sample { id, .. } => *id,
            PendingWrite::Close(summary) => summary.id,
        }
    }

    fn apply(&self, writer: &mut LogWriter) -> PersistenceResult<()> {
        match self {
            PendingWrite::Open { id, first_seen } => writer.track_opened(*id, *first_seen).map(|_| ()),
            PendingWrite::Sample { id, sample, raw_hex } => writer.append_sample(*id, sample, raw_hex),
            PendingWrite::Close(summary) => writer.track_closed(summary),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackView {
    pub id: TrackId,
    pub status: TrackStatus,
    #[serde(with = "timestamp::iso_millis")]
    pub first_seen: Timestamp,
    pub latest: Option<SmoothedSample>,
}

/// State handed to the presentation consumer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub open: Vec<TrackView>,
    pub recent: Vec<TrackSummary>,
    pub fastest_speed_mm_s: f64,
    pub metrics: MetricsSnapshot,
}

pub struct Pipeline {
    tracker: TrackManager,
    writer: Option<LogWriter>,
    metrics: Arc<MetricsRecorder>,
    recent: VecDeque<TrackSummary>,
    backlog: VecDeque<PendingWrite>,
    last_capture: Option<Timestamp>,
    logger: LogManager,
}

impl Pipeline {
    /// With a writer, serial numbering continues after the highest serial
    /// already in today's index.
    pub fn new(
        config: TrackerConfig,
        writer: Option<LogWriter>,
        metrics: Arc<MetricsRecorder>,
    ) -> PersistenceResult<Self> {
        let first_serial = match &writer {
            Some(writer) => writer.highest_serial(capture_now().date())? + 1,
            None => 1,
        };
        Ok(Self {
            tracker: TrackManager::with_first_serial(config, first_serial),
            writer,
            metrics,
            recent: VecDeque::with_capacity(RECENT_CLOSED + 1),
            backlog: VecDeque::new(),
            last_capture: None,
            logger: LogManager::new("radarcore::pipeline"),
        })
    }

    pub fn tracker(&self) -> &TrackManager {
        &self.tracker
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Log writes still waiting for a successful retry.
    pub fn pending_writes(&self) -> usize {
        self.backlog.len()
    }

    /// Processes one ingested item. Tracking always advances; a persistence
    /// failure is reported after every queued write has been attempted.
    pub fn handle(&mut self, ingest: Ingest) -> Result<Vec<TrackEvent>, PersistenceError> {
        let (events, raw_hex) = match ingest {
            Ingest::Batch(mut batch) => {
                batch.captured_at = self.monotonic(batch.captured_at);
                self.metrics.record_processed();
                let raw_hex = batch.raw_hex();
                (self.tracker.process(&batch), raw_hex)
            }
            Ingest::Rejected { captured_at, error } => {
                let at = self.monotonic(captured_at);
                self.metrics.record_decode_error();
                self.logger
                    .warn(&format!("frame skipped ({error}); counted as a missed detection"));
                (self.tracker.note_missed(at), String::new())
            }
        };
        self.persist(&events, &raw_hex)?;
        Ok(events)
    }

    /// Closes every open track and retries queued writes so no index row
    /// stays provisional.
    pub fn shutdown(&mut self) -> Result<Vec<TrackEvent>, PersistenceError> {
        let events = self.tracker.close_all();
        self.logger
            .record(&format!("shutdown closed {} open tracks", events.len()));
        self.persist(&events, "")?;
        Ok(events)
    }

    /// Single-consumer loop: drains `queue` until `stop` is raised, then
    /// closes all tracks. `observe` sees every processed item's events.
    pub fn consume(
        &mut self,
        queue: &HandoffQueue<Ingest>,
        stop: &AtomicBool,
        mut observe: impl FnMut(&Pipeline, &[TrackEvent]),
    ) -> Vec<TrackEvent> {
        while !stop.load(Ordering::Relaxed) {
            let Some(ingest) = queue.pop_timeout(POLL_INTERVAL) else {
                continue;
            };
            let events = match self.handle(ingest) {
                Ok(events) => events,
                Err(err) => {
                    self.logger
                        .fault(&format!("track log write failed, tracking continues: {err}"));
                    Vec::new()
                }
            };
            observe(self, &events);
        }
        while let Some(ingest) = queue.pop() {
            if let Ok(events) = self.handle(ingest) {
                observe(self, &events);
            }
        }
        match self.shutdown() {
            Ok(events) => {
                observe(self, &events);
                events
            }
            Err(err) => {
                self.logger.fault(&format!("closing logs failed: {err}"));
                Vec::new()
            }
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let open: Vec<TrackView> = self
            .tracker
            .open_tracks()
            .map(|track| TrackView {
                id: track.id,
                status: track.status,
                first_seen: track.first_seen,
                latest: track.latest().copied(),
            })
            .collect();
        let fastest_speed_mm_s = open
            .iter()
            .filter_map(|view| view.latest.map(|s| s.speed_mm_s.abs()))
            .fold(0.0, f64::max);
        PipelineSnapshot {
            open,
            recent: self.recent.iter().cloned().collect(),
            fastest_speed_mm_s,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Capture times never run backwards into the tracker or the logs.
    fn monotonic(&mut self, captured_at: Timestamp) -> Timestamp {
        let at = match self.last_capture {
            Some(last) if captured_at < last => last,
            _ => captured_at,
        };
        self.last_capture = Some(at);
        at
    }

    fn persist(&mut self, events: &[TrackEvent], raw_hex: &str) -> PersistenceResult<()> {
        for event in events {
            match event {
                TrackEvent::Created { id, sample } => {
                    self.backlog.push_back(PendingWrite::Open {
                        id: *id,
                        first_seen: sample.captured_at,
                    });
                    self.backlog.push_back(PendingWrite::Sample {
                        id: *id,
                        sample: *sample,
                        raw_hex: raw_hex.to_string(),
                    });
                }
                TrackEvent::Updated { id, sample, .. } => {
                    self.backlog.push_back(PendingWrite::Sample {
                        id: *id,
                        sample: *sample,
                        raw_hex: raw_hex.to_string(),
                    });
                }
                TrackEvent::Closed(summary) => {
                    self.recent.push_front(summary.clone());
                    self.recent.truncate(RECENT_CLOSED);
                    self.backlog.push_back(PendingWrite::Close(summary.clone()));
                }
                TrackEvent::Rejected { .. } => self.metrics.record_tracking_fault(),
                TrackEvent::Stale { .. } => {}
            }
        }
        self.flush_backlog()
    }

    /// Attempts every queued write in order. A failed write stays queued and
    /// holds back the later writes of its track, keeping rows in time order.
    fn flush_backlog(&mut self) -> PersistenceResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            self.backlog.clear();
            return Ok(());
        };
        let mut blocked: Vec<TrackId> = Vec::new();
        let mut kept = VecDeque::new();
        let mut first_failure = None;

        while let Some(write) = self.backlog.pop_front() {
            let id = write.track();
            if blocked.contains(&id) {
                kept.push_back(write);
                continue;
            }
            if let Err(err) = write.apply(writer) {
                self.metrics.record_persistence_failure();
                self.logger.fault(&format!("persisting {write:?} failed, will retry: {err}"));
                blocked.push(id);
                kept.push_back(write);
                first_failure.get_or_insert(err);
            }
        }
        self.backlog = kept;
        self.trim_backlog();

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn trim_backlog(&mut self) {
        let mut excess = self.backlog.len().saturating_sub(BACKLOG_LIMIT);
        if excess == 0 {
            return;
        }
        let before = self.backlog.len();
        self.backlog.retain(|write| {
            if excess > 0 && matches!(write, PendingWrite::Sample { .. }) {
                excess -= 1;
                return false;
            }
            true
        });
        self.logger.warn(&format!(
            "log backlog full, discarded {} queued rows",
            before - self.backlog.len()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{FrameError, SmoothingConfig};
    use crate::wire::detection::RawDetectionSlot;
    use crate::wire::frame::{decode_frame, encode_frame};
    use chrono::NaiveDate;

    fn at(ms: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(ms)
    }

    fn ingest(ms: i64, slots: &[(u8, i32, i32, i32)]) -> Ingest {
        let slots: Vec<RawDetectionSlot> = slots
            .iter()
            .map(|&(ch, x, y, v)| RawDetectionSlot::new(ch, x, y, v, 0))
            .collect();
        Ingest::Batch(decode_frame(&encode_frame(&slots).unwrap(), at(ms)).unwrap())
    }

    fn config() -> TrackerConfig {
        TrackerConfig {
            gating_radius_mm: 500.0,
            stale_timeout_ms: 1_000,
            smoothing: SmoothingConfig::new(true, 2),
        }
    }

    #[test]
    fn rejected_frames_are_counted_and_never_open_tracks() {
        let metrics = Arc::new(MetricsRecorder::new());
        let mut pipeline = Pipeline::new(config(), None, metrics.clone()).unwrap();
        let events = pipeline
            .handle(Ingest::Rejected {
                captured_at: at(0),
                error: FrameError::BadFooter { found: "0000".into() },
            })
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(metrics.snapshot().decode_errors, 1);
        assert_eq!(pipeline.tracker().open_count(), 0);
    }

    #[test]
    fn backwards_capture_time_is_clamped() {
        let mut pipeline = Pipeline::new(config(), None, Arc::new(MetricsRecorder::new())).unwrap();
        pipeline.handle(ingest(1_000, &[(0, 0, 1000, 0)])).unwrap();
        let events = pipeline.handle(ingest(200, &[(0, 5, 1000, 0)])).unwrap();
        let (_, sample) = events[0].sample().unwrap();
        assert_eq!(sample.captured_at, at(1_000));
        assert_eq!(sample.accel_mm_s2, 0.0);
    }

    #[test]
    fn snapshot_reports_recent_closures_and_fastest_speed() {
        let mut pipeline = Pipeline::new(config(), None, Arc::new(MetricsRecorder::new())).unwrap();
        pipeline
            .handle(ingest(0, &[(0, 0, 1000, 30), (1, 3000, 1000, -90)]))
            .unwrap();
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.open.len(), 2);
        assert_eq!(snapshot.fastest_speed_mm_s, 90.0);

        pipeline.handle(ingest(2_000, &[])).unwrap();
        let snapshot = pipeline.snapshot();
        assert!(snapshot.open.is_empty());
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.metrics.processed, 2);
    }
}
