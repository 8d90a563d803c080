//! Per-track detail log: one append-only row per smoothed sample, carrying
//! the raw frame it came from.

use crate::prelude::{PersistenceError, PersistenceResult};
use crate::wire::detection::SmoothedSample;
use crate::wire::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const DETAIL_HEADER: [&str; 7] = [
    "timestamp",
    "x_mm",
    "y_mm",
    "range_mm",
    "speed_mm_s",
    "accel_mm_s2",
    "raw_hex",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailLogRow {
    #[serde(with = "timestamp::iso_millis")]
    pub timestamp: Timestamp,
    pub x_mm: f64,
    pub y_mm: f64,
    pub range_mm: f64,
    pub speed_mm_s: f64,
    pub accel_mm_s2: f64,
    pub raw_hex: String,
}

impl DetailLogRow {
    pub fn from_sample(sample: &SmoothedSample, raw_hex: String) -> Self {
        Self {
            timestamp: sample.captured_at,
            x_mm: sample.x_mm,
            y_mm: sample.y_mm,
            range_mm: sample.range_mm,
            speed_mm_s: sample.speed_mm_s,
            accel_mm_s2: sample.accel_mm_s2,
            raw_hex,
        }
    }
}

/// Open append handle on one detail file. Every row is flushed before
/// `append` returns.
pub struct DetailWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    last_timestamp: Option<Timestamp>,
}

impl DetailWriter {
    /// Opens `path` for appending, writing the header if the file is new.
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| PersistenceError::io(path, err))?;
        let is_new = file
            .metadata()
            .map_err(|err| PersistenceError::io(path, err))?
            .len()
            == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer
                .write_record(DETAIL_HEADER)
                .map_err(|err| PersistenceError::csv(path, err))?;
            writer.flush().map_err(|err| PersistenceError::io(path, err))?;
        }
        let last_timestamp = if is_new {
            None
        } else {
            read_detail(path)?.last().map(|row| row.timestamp)
        };
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            last_timestamp,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &DetailLogRow) -> PersistenceResult<()> {
        if let Some(last) = self.last_timestamp {
            if row.timestamp < last {
                return Err(PersistenceError::Corrupt {
                    path: self.path.clone(),
                    reason: format!(
                        "row at {} precedes last row at {}",
                        timestamp::format_iso(&row.timestamp),
                        timestamp::format_iso(&last)
                    ),
                });
            }
        }
        self.writer
            .serialize(row)
            .map_err(|err| PersistenceError::csv(&self.path, err))?;
        self.writer
            .flush()
            .map_err(|err| PersistenceError::io(&self.path, err))?;
        self.last_timestamp = Some(row.timestamp);
        Ok(())
    }
}

pub fn read_detail(path: &Path) -> PersistenceResult<Vec<DetailLogRow>> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    reader
        .deserialize()
        .collect::<Result<Vec<DetailLogRow>, _>>()
        .map_err(|err| PersistenceError::csv(path, err))
}
