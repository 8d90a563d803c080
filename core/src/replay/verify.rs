use crate::math::stats::StatsHelper;
use crate::prelude::{ReplayError, TrackerConfig};
use crate::replay::engine::ReplayEngine;
use crate::storage::detail::{read_detail, DetailLogRow};
use crate::wire::detection::SmoothedSample;
use serde::Serialize;
use std::path::Path;

/// Agreement between a detail log and its offline re-computation.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub rows: usize,
    pub max_deviation: f64,
    pub rms_deviation: f64,
    /// Rows whose largest field difference exceeds the tolerance.
    pub mismatched_rows: Vec<usize>,
    #[serde(skip)]
    pub replayed: Vec<SmoothedSample>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatched_rows.is_empty()
    }
}

/// Re-decodes every row's raw frame and re-runs gating and smoothing with
/// `config`, comparing the logged track against the recomputed one.
pub fn verify_replay(
    rows: &[DetailLogRow],
    config: TrackerConfig,
    tolerance: f64,
) -> Result<ReplayReport, ReplayError> {
    let mut engine = ReplayEngine::new(rows.to_vec(), config, 1.0)?;
    let mut deviations = Vec::with_capacity(rows.len());
    let mut replayed = Vec::with_capacity(rows.len());
    let mut mismatched_rows = Vec::new();

    while let Some(frame) = engine.step()? {
        if frame.deviation > tolerance {
            mismatched_rows.push(frame.index);
        }
        deviations.push(frame.deviation);
        replayed.push(frame.replayed);
    }

    Ok(ReplayReport {
        rows: deviations.len(),
        max_deviation: StatsHelper::max_abs(&deviations),
        rms_deviation: StatsHelper::rms(&deviations),
        mismatched_rows,
        replayed,
    })
}

pub fn verify_detail_file(
    path: &Path,
    config: TrackerConfig,
    tolerance: f64,
) -> Result<ReplayReport, ReplayError> {
    let rows = read_detail(path)?;
    verify_replay(&rows, config, tolerance)
}
