//! Per-day track index: one row per track, created provisional at birth
//! and finalised at closure.

use crate::prelude::{PersistenceError, PersistenceResult};
use crate::processing::tracking::{TrackId, TrackSummary};
use crate::wire::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

pub const INDEX_FILE: &str = "track_index.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackIndexEntry {
    pub serial: TrackId,
    #[serde(with = "timestamp::iso_millis")]
    pub first_seen_iso: Timestamp,
    #[serde(with = "timestamp::iso_millis")]
    pub last_seen_iso: Timestamp,
    pub duration_ms: i64,
    /// Detail file name, relative to the day directory.
    pub detail_file: String,
}

impl TrackIndexEntry {
    pub fn provisional(serial: TrackId, first_seen: Timestamp, detail_file: String) -> Self {
        Self {
            serial,
            first_seen_iso: first_seen,
            last_seen_iso: first_seen,
            duration_ms: 0,
            detail_file,
        }
    }

    pub fn finalise(&mut self, summary: &TrackSummary) {
        self.last_seen_iso = summary.last_seen;
        self.duration_ms = summary.duration_ms;
    }
}

/// Reads an index; a missing file is an empty index.
pub fn read_index(path: &Path) -> PersistenceResult<Vec<TrackIndexEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    reader
        .deserialize()
        .collect::<Result<Vec<TrackIndexEntry>, _>>()
        .map_err(|err| PersistenceError::csv(path, err))
}

/// Rewrites the whole index through a temporary file and a rename, so an
/// interrupted update leaves the previous index intact.
pub fn write_index(path: &Path, entries: &[TrackIndexEntry]) -> PersistenceResult<()> {
    let staging = path.with_extension("csv.tmp");
    {
        let file = File::create(&staging).map_err(|err| PersistenceError::io(&staging, err))?;
        let mut writer = csv::Writer::from_writer(file);
        if entries.is_empty() {
            writer
                .write_record([
                    "serial",
                    "first_seen_iso",
                    "last_seen_iso",
                    "duration_ms",
                    "detail_file",
                ])
                .map_err(|err| PersistenceError::csv(&staging, err))?;
        }
        for entry in entries {
            writer
                .serialize(entry)
                .map_err(|err| PersistenceError::csv(&staging, err))?;
        }
        let file = writer
            .into_inner()
            .map_err(|err| PersistenceError::io(&staging, err.into_error()))?;
        file.sync_all()
            .map_err(|err| PersistenceError::io(&staging, err))?;
    }
    fs::rename(&staging, path).map_err(|err| PersistenceError::io(path, err))
}
