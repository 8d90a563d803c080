mod common;

use common::{config, day, ingest};
use radarcore::prelude::{SmoothingConfig, TrackerConfig};
use radarcore::replay::{verify_replay, ReplayEngine};
use radarcore::storage::{read_detail, recent_detail_files, DetailLogRow, LogWriter};
use radarcore::telemetry::MetricsRecorder;
use radarcore::Pipeline;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Heavy smoothing trails a walker by several frames of travel, so the gate
/// must cover that lag.
fn wide_gate(level: u8) -> TrackerConfig {
    TrackerConfig {
        gating_radius_mm: 1_000.0,
        smoothing: SmoothingConfig::new(true, level),
        ..config()
    }
}

/// Two people walking past each other at a safe distance, logged live.
fn record_session(root: &Path, config: TrackerConfig) {
    let writer = LogWriter::open(root).unwrap();
    let mut pipeline = Pipeline::new(config, Some(writer), Arc::new(MetricsRecorder::new())).unwrap();
    for i in 0..25i64 {
        let k = i as i32;
        let mut targets = vec![(0, -1500 + 20 * k, 1200 + 3 * k, 200 - 4 * k)];
        if i % 7 != 3 {
            targets.push((1, 1500 - 15 * k, 2600, -150 + 10 * k));
        }
        pipeline.handle(ingest(i * 100, &targets)).unwrap();
    }
    pipeline.shutdown().unwrap();
}

fn logged_tracks(root: &Path) -> Vec<Vec<DetailLogRow>> {
    let log = LogWriter::open(root).unwrap();
    let mut index = log.index_entries(day()).unwrap();
    index.sort_by_key(|entry| entry.serial);
    index
        .iter()
        .map(|entry| read_detail(&log.day_dir(day()).join(&entry.detail_file)).unwrap())
        .collect()
}

#[test]
fn every_logged_track_replays_exactly() {
    let dir = tempdir().unwrap();
    record_session(dir.path(), wide_gate(5));
    let tracks = logged_tracks(dir.path());
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].len(), 25);

    for rows in &tracks {
        let report = verify_replay(rows, wide_gate(5), 1e-9).unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.rows, rows.len());
        assert_eq!(report.max_deviation, 0.0);
    }
}

/// Walkers entering at different times and passing within a gate of each
/// other, so association has to choose between them.
fn record_crossing(root: &Path, config: TrackerConfig) {
    let writer = LogWriter::open(root).unwrap();
    let mut pipeline = Pipeline::new(config, Some(writer), Arc::new(MetricsRecorder::new())).unwrap();
    for i in 0..40i64 {
        let k = i as i32;
        let mut targets = vec![(0, -1200 + 30 * k, 1500, 120)];
        if i >= 6 {
            targets.push((1, 1200 - 35 * (k - 6), 2100, -140));
        }
        if (12..30).contains(&i) {
            targets.push((2, -300 + 10 * (k - 12), 1900 + 5 * (k - 12), 60));
        }
        pipeline.handle(ingest(i * 100, &targets)).unwrap();
    }
    pipeline.shutdown().unwrap();
}

#[test]
fn tracks_sharing_frames_replay_exactly() {
    let dir = tempdir().unwrap();
    record_crossing(dir.path(), wide_gate(5));
    let tracks = logged_tracks(dir.path());
    assert!(tracks.len() >= 3, "{} tracks", tracks.len());

    for rows in &tracks {
        let report = verify_replay(rows, wide_gate(5), 1e-9).unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.max_deviation, 0.0);
    }
}

#[test]
fn replay_at_speed_matches_stepwise_verification() {
    let dir = tempdir().unwrap();
    let strong = wide_gate(10);
    record_session(dir.path(), strong);
    let latest = recent_detail_files(dir.path(), 1).unwrap();
    let rows = read_detail(&latest[0]).unwrap();

    let mut engine = ReplayEngine::new(rows.clone(), strong, 20.0).unwrap();
    let mut replayed = Vec::new();
    let emitted = engine.run(|frame| replayed.push(frame.replayed)).unwrap();
    assert_eq!(emitted, rows.len());

    let report = verify_replay(&rows, strong, 1e-9).unwrap();
    assert_eq!(report.replayed, replayed);
}

#[test]
fn replay_with_a_different_configuration_is_flagged() {
    let dir = tempdir().unwrap();
    record_session(dir.path(), wide_gate(5));
    let tracks = logged_tracks(dir.path());
    let lighter = wide_gate(1);
    let report = verify_replay(&tracks[0], lighter, 1e-3).unwrap();
    assert!(!report.is_consistent());
    assert!(report.max_deviation > 1e-3);
}
