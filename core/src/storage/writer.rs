//! Append-only persistence of track histories.
//!
//! Layout under the log root:
//!
//! ```text
//! <root>/<YYYY-MM-DD>/track_index.csv
//! <root>/<YYYY-MM-DD>/T<serial>_<HHMMSS>.csv
//! ```
//!
//! A track belongs to the local calendar day of its first sighting, even if
//! it is still alive after midnight.

use crate::prelude::{PersistenceError, PersistenceResult};
use crate::processing::tracking::{TrackId, TrackSummary};
use crate::storage::detail::{DetailLogRow, DetailWriter};
use crate::storage::index::{read_index, write_index, TrackIndexEntry, INDEX_FILE};
use crate::telemetry::log::LogManager;
use crate::wire::detection::SmoothedSample;
use crate::wire::timestamp::Timestamp;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

struct OpenDetail {
    day: NaiveDate,
    path: PathBuf,
    /// `None` after a failed open; retried on the next append.
    writer: Option<DetailWriter>,
}

pub struct LogWriter {
    root: PathBuf,
    open: HashMap<TrackId, OpenDetail>,
    logger: LogManager,
}

impl LogWriter {
    pub fn open(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| PersistenceError::io(&root, err))?;
        Ok(Self {
            root,
            open: HashMap::new(),
            logger: LogManager::new("radarcore::storage"),
        })
    }

    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root.join(day.format("%Y-%m-%d").to_string())
    }

    pub fn index_path(&self, day: NaiveDate) -> PathBuf {
        self.day_dir(day).join(INDEX_FILE)
    }

    pub fn index_entries(&self, day: NaiveDate) -> PersistenceResult<Vec<TrackIndexEntry>> {
        read_index(&self.index_path(day))
    }

    /// Highest serial already recorded for `day`, 0 when none.
    pub fn highest_serial(&self, day: NaiveDate) -> PersistenceResult<u64> {
        Ok(self
            .index_entries(day)?
            .iter()
            .map(|entry| entry.serial.0)
            .max()
            .unwrap_or(0))
    }

    /// Adds the provisional index row and creates the detail file.
    pub fn track_opened(&mut self, id: TrackId, first_seen: Timestamp) -> PersistenceResult<PathBuf> {
        let day = first_seen.date();
        let day_dir = self.day_dir(day);
        fs::create_dir_all(&day_dir).map_err(|err| PersistenceError::io(&day_dir, err))?;

        let file_name = format!("{}_{}.csv", id, first_seen.format("%H%M%S"));
        let path = day_dir.join(&file_name);

        let index_path = self.index_path(day);
        let mut entries = read_index(&index_path)?;
        entries.retain(|entry| entry.serial != id);
        entries.push(TrackIndexEntry::provisional(id, first_seen, file_name));
        write_index(&index_path, &entries)?;

        let (writer, failure) = match DetailWriter::open(&path) {
            Ok(writer) => (Some(writer), None),
            Err(err) => (None, Some(err)),
        };
        self.open.insert(
            id,
            OpenDetail {
                day,
                path: path.clone(),
                writer,
            },
        );
        if let Some(err) = failure {
            return Err(err);
        }
        self.logger
            .record(&format!("{} logging to {}", id, path.display()));
        Ok(path)
    }

    /// Appends one row; returns once the row has been flushed.
    pub fn append_sample(
        &mut self,
        id: TrackId,
        sample: &SmoothedSample,
        raw_hex: &str,
    ) -> PersistenceResult<()> {
        let detail = self
            .open
            .get_mut(&id)
            .ok_or(PersistenceError::UnknownTrack(id.0))?;
        if detail.writer.is_none() {
            detail.writer = Some(DetailWriter::open(&detail.path)?);
        }
        let row = DetailLogRow::from_sample(sample, raw_hex.to_string());
        match detail.writer.as_mut() {
            Some(writer) => writer.append(&row),
            None => Err(PersistenceError::UnknownTrack(id.0)),
        }
    }

    /// Finalises the index row and releases the detail file.
    pub fn track_closed(&mut self, summary: &TrackSummary) -> PersistenceResult<()> {
        let day = self
            .open
            .get(&summary.id)
            .map(|detail| detail.day)
            .unwrap_or_else(|| summary.first_seen.date());
        let index_path = self.index_path(day);
        let mut entries = read_index(&index_path)?;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.serial == summary.id)
            .ok_or_else(|| PersistenceError::Corrupt {
                path: index_path.clone(),
                reason: format!("no index row for {}", summary.id),
            })?;
        entry.finalise(summary);
        write_index(&index_path, &entries)?;
        self.open.remove(&summary.id);
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Detail files of the most recent tracks across all days, newest first.
pub fn recent_detail_files(root: &Path, limit: usize) -> PersistenceResult<Vec<PathBuf>> {
    let mut days: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|err| PersistenceError::io(root, err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.join(INDEX_FILE).is_file())
        .collect();
    days.sort();

    let mut found = Vec::new();
    for day in days.iter().rev() {
        let mut entries = read_index(&day.join(INDEX_FILE))?;
        entries.sort_by(|a, b| b.first_seen_iso.cmp(&a.first_seen_iso));
        for entry in entries {
            let path = day.join(&entry.detail_file);
            if path.is_file() {
                found.push(path);
            }
            if found.len() == limit {
                return Ok(found);
            }
        }
    }
    Ok(found)
}
