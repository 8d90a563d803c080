//! Track lifecycle: birth, update, staleness and closure.
//!
//! # Lifecycle
//! - **Birth**: a slot left unmatched by association opens a new track with
//!   the next serial.
//! - **Update**: a matched slot is smoothed into the track's filter and
//!   resets its staleness clock (`StalePendingClose -> Active`).
//! - **Staleness**: an open track with no match in a batch becomes
//!   `StalePendingClose`.
//! - **Closure**: once more than `stale_timeout_ms` separates the batch time
//!   from the track's last match the track closes. `last_seen` stays at the
//!   last matched batch.
//!
//! Staleness is evaluated once per processed batch (or rejected frame),
//! never on a timer, so replay sees exactly the same transitions.

use crate::prelude::{TrackerConfig, TrackingInconsistency};
use crate::processing::association::associate;
use crate::processing::smoothing::FilterState;
use crate::telemetry::log::LogManager;
use crate::wire::detection::{DetectionBatch, RawDetectionSlot, SmoothedSample};
use crate::wire::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Serial identifier assigned at birth, unique within a run and day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.trim()
            .strip_prefix('T')
            .and_then(|digits| digits.parse().ok())
            .map(TrackId)
            .ok_or_else(|| format!("not a track serial: {text:?}"))
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TrackId {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Active,
    StalePendingClose,
    Closed,
}

/// One physical target's continuous detection interval.
#[derive(Clone, Debug)]
pub struct Track {
    pub id: TrackId,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub status: TrackStatus,
    pub samples: u64,
    filter: FilterState,
}

impl Track {
    fn new(id: TrackId, born_at: Timestamp) -> Self {
        Self {
            id,
            first_seen: born_at,
            last_seen: born_at,
            status: TrackStatus::Active,
            samples: 0,
            filter: FilterState::new(),
        }
    }

    pub fn latest(&self) -> Option<&SmoothedSample> {
        self.filter.last()
    }

    /// Last smoothed position, used as the association anchor.
    pub fn position(&self) -> (f64, f64) {
        self.latest()
            .map(|s| (s.x_mm, s.y_mm))
            .unwrap_or((0.0, 0.0))
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            duration_ms: (self.last_seen - self.first_seen).num_milliseconds(),
            samples: self.samples,
        }
    }
}

/// Immutable record of a closed (or snapshot of an open) track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSummary {
    pub id: TrackId,
    #[serde(with = "timestamp::iso_millis")]
    pub first_seen: Timestamp,
    #[serde(with = "timestamp::iso_millis")]
    pub last_seen: Timestamp,
    pub duration_ms: i64,
    pub samples: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackEvent {
    Created {
        id: TrackId,
        sample: SmoothedSample,
    },
    Updated {
        id: TrackId,
        sample: SmoothedSample,
        reactivated: bool,
    },
    Stale {
        id: TrackId,
        last_seen: Timestamp,
    },
    Closed(TrackSummary),
    /// Detection dropped because accepting it would corrupt an open track.
    Rejected {
        slot: RawDetectionSlot,
        fault: TrackingInconsistency,
    },
}

impl TrackEvent {
    pub fn sample(&self) -> Option<(TrackId, &SmoothedSample)> {
        match self {
            TrackEvent::Created { id, sample } | TrackEvent::Updated { id, sample, .. } => {
                Some((*id, sample))
            }
            _ => None,
        }
    }
}

/// Owns every open track. Mutated by exactly one consumer.
pub struct TrackManager {
    config: TrackerConfig,
    next_serial: u64,
    open: BTreeMap<TrackId, Track>,
    logger: LogManager,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_first_serial(config, 1)
    }

    /// Starts numbering at `first`, e.g. one past the highest serial already
    /// present in today's index.
    pub fn with_first_serial(config: TrackerConfig, first: u64) -> Self {
        Self {
            config,
            next_serial: first,
            open: BTreeMap::new(),
            logger: LogManager::new("radarcore::tracking"),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }

    /// Moves the serial counter; used when the persisted index already holds
    /// higher serials than this manager has issued.
    pub fn resume_serials(&mut self, next: u64) {
        self.next_serial = next;
    }

    pub fn open_tracks(&self) -> impl Iterator<Item = &Track> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.open.get(&id)
    }

    pub fn process(&mut self, batch: &DetectionBatch) -> Vec<TrackEvent> {
        let now = batch.captured_at;
        let anchors: Vec<(u64, (f64, f64))> = self
            .open
            .values()
            .map(|track| (track.id.0, track.position()))
            .collect();
        let assignment = associate(&anchors, &batch.slots, self.config.gating_radius_mm);

        let mut matched_for_slot: Vec<Option<TrackId>> = vec![None; batch.slots.len()];
        for edge in &assignment.pairs {
            matched_for_slot[edge.slot_idx] = Some(TrackId(edge.track_id));
        }

        let mut events = Vec::new();
        for (slot, matched) in batch.slots.iter().zip(matched_for_slot) {
            let event = match matched {
                Some(id) => self.update(id, slot, now),
                None => self.birth(slot, now),
            };
            events.extend(event);
        }

        let touched: Vec<TrackId> = events
            .iter()
            .filter_map(|event| event.sample().map(|(id, _)| id))
            .collect();
        events.extend(self.expire(now, &touched));
        events
    }

    /// A frame that failed to decode: no track is updated, staleness advances.
    pub fn note_missed(&mut self, at: Timestamp) -> Vec<TrackEvent> {
        self.expire(at, &[])
    }

    /// Closes every open track at its own last match time. Active tracks pass
    /// through `StalePendingClose` first, as they would on a timeout.
    pub fn close_all(&mut self) -> Vec<TrackEvent> {
        let open = std::mem::take(&mut self.open);
        let mut events = Vec::with_capacity(open.len() * 2);
        for mut track in open.into_values() {
            if track.status == TrackStatus::Active {
                events.push(TrackEvent::Stale {
                    id: track.id,
                    last_seen: track.last_seen,
                });
            }
            track.status = TrackStatus::Closed;
            let summary = track.summary();
            self.logger.record(&format!(
                "closed {} on shutdown after {} ms",
                summary.id, summary.duration_ms
            ));
            events.push(TrackEvent::Closed(summary));
        }
        events
    }

    fn update(&mut self, id: TrackId, slot: &RawDetectionSlot, now: Timestamp) -> Option<TrackEvent> {
        let smoothing = self.config.smoothing;
        let track = self.open.get_mut(&id)?;
        let reactivated = track.status == TrackStatus::StalePendingClose;
        let sample = track.filter.apply(slot, now, &smoothing);
        track.status = TrackStatus::Active;
        track.last_seen = now;
        track.samples += 1;
        self.logger.detail(&format!(
            "{} at ({:.0}, {:.0}) mm, {:.0} mm/s",
            id, sample.x_mm, sample.y_mm, sample.speed_mm_s
        ));
        Some(TrackEvent::Updated {
            id,
            sample,
            reactivated,
        })
    }

    fn birth(&mut self, slot: &RawDetectionSlot, now: Timestamp) -> Option<TrackEvent> {
        let id = TrackId(self.next_serial);
        if self.open.contains_key(&id) {
            let fault = TrackingInconsistency::DuplicateSerial(id.0);
            self.logger
                .fault(&format!("{fault}; dropping detection on slot {}", slot.slot));
            return Some(TrackEvent::Rejected { slot: *slot, fault });
        }
        self.next_serial += 1;

        let mut track = Track::new(id, now);
        let sample = track.filter.apply(slot, now, &self.config.smoothing);
        track.samples = 1;
        self.open.insert(id, track);
        self.logger.record(&format!(
            "opened {} at ({:.0}, {:.0}) mm",
            id, sample.x_mm, sample.y_mm
        ));
        Some(TrackEvent::Created { id, sample })
    }

    fn expire(&mut self, now: Timestamp, touched: &[TrackId]) -> Vec<TrackEvent> {
        let timeout_ms = self.config.stale_timeout_ms as i64;
        let mut events = Vec::new();
        let mut closing = Vec::new();

        for track in self.open.values_mut() {
            if touched.contains(&track.id) {
                continue;
            }
            let silent_ms = (now - track.last_seen).num_milliseconds();
            if silent_ms > timeout_ms {
                closing.push(track.id);
            } else if track.status == TrackStatus::Active {
                track.status = TrackStatus::StalePendingClose;
                events.push(TrackEvent::Stale {
                    id: track.id,
                    last_seen: track.last_seen,
                });
            }
        }

        for id in closing {
            if let Some(mut track) = self.open.remove(&id) {
                track.status = TrackStatus::Closed;
                let summary = track.summary();
                self.logger.record(&format!(
                    "closed {} after {} ms ({} samples)",
                    summary.id, summary.duration_ms, summary.samples
                ));
                events.push(TrackEvent::Closed(summary));
            }
        }
        events
    }
}
