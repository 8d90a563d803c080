mod common;

use common::{at, config, day, ingest};
use radarcore::processing::TrackEvent;
use radarcore::storage::{read_detail, LogWriter};
use radarcore::telemetry::MetricsRecorder;
use radarcore::wire::decode_hex_frame;
use radarcore::Pipeline;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn single_walker_is_tracked_smoothed_and_archived() {
    let dir = tempdir().unwrap();
    let writer = LogWriter::open(dir.path()).unwrap();
    let mut pipeline = Pipeline::new(config(), Some(writer), Arc::new(MetricsRecorder::new())).unwrap();

    let mut events = Vec::new();
    events.extend(pipeline.handle(ingest(0, &[(0, 1000, 500, 0)])).unwrap());
    events.extend(pipeline.handle(ingest(100, &[(0, 1010, 505, 50)])).unwrap());
    events.extend(pipeline.handle(ingest(200, &[(0, 1020, 515, 60)])).unwrap());

    let created = events
        .iter()
        .filter(|e| matches!(e, TrackEvent::Created { .. }))
        .count();
    let updated: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TrackEvent::Updated { sample, .. } => Some(*sample),
            _ => None,
        })
        .collect();
    assert_eq!(created, 1);
    assert_eq!(updated.len(), 2);
    // smoothed values trail the raw ones
    assert!(updated[0].x_mm > 1000.0 && updated[0].x_mm < 1010.0);
    assert!(updated[1].x_mm < 1020.0);
    assert!(updated[1].speed_mm_s < 60.0);
    assert!(updated[1].accel_mm_s2 > 0.0);

    // nothing seen for longer than the timeout
    let closing = pipeline.handle(ingest(3_300, &[])).unwrap();
    assert!(matches!(closing.as_slice(), [TrackEvent::Closed(summary)] if summary.duration_ms == 200));

    let log = LogWriter::open(dir.path()).unwrap();
    let index = log.index_entries(day()).unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].serial.to_string(), "T1");
    assert_eq!(index[0].first_seen_iso, at(0));
    assert_eq!(index[0].last_seen_iso, at(200));
    assert_eq!(index[0].duration_ms, 200);

    let rows = read_detail(&log.day_dir(day()).join(&index[0].detail_file)).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].x_mm, 1000.0);
    assert_eq!(rows[2].timestamp, at(200));
    let raw = decode_hex_frame(&rows[1].raw_hex, rows[1].timestamp).unwrap();
    assert_eq!(raw.slots[0].x_mm, 1010);
    assert_eq!(raw.slots[0].speed_mm_s, 50);
}

#[test]
fn three_tracks_close_at_their_own_last_match() {
    let dir = tempdir().unwrap();
    let writer = LogWriter::open(dir.path()).unwrap();
    let mut pipeline = Pipeline::new(config(), Some(writer), Arc::new(MetricsRecorder::new())).unwrap();

    pipeline
        .handle(ingest(0, &[(0, -2000, 1000, 0), (1, 0, 2000, 0), (2, 2000, 3000, 0)]))
        .unwrap();
    pipeline.handle(ingest(400, &[(0, -1990, 1000, 10), (1, 10, 2000, 10)])).unwrap();
    pipeline.handle(ingest(900, &[(0, -1980, 1000, 10)])).unwrap();
    assert_eq!(pipeline.tracker().open_count(), 3);

    let closed = pipeline.handle(ingest(5_000, &[])).unwrap();
    assert_eq!(closed.len(), 3);
    assert_eq!(pipeline.snapshot().recent.len(), 3);

    let mut index = LogWriter::open(dir.path()).unwrap().index_entries(day()).unwrap();
    index.sort_by_key(|entry| entry.serial);
    let last_seen: Vec<_> = index.iter().map(|entry| entry.last_seen_iso).collect();
    assert_eq!(last_seen, vec![at(900), at(400), at(0)]);
    let durations: Vec<_> = index.iter().map(|entry| entry.duration_ms).collect();
    assert_eq!(durations, vec![900, 400, 0]);
}

#[test]
fn snapshot_serialises_for_the_presentation_layer() {
    let mut pipeline = Pipeline::new(config(), None, Arc::new(MetricsRecorder::new())).unwrap();
    pipeline.handle(ingest(0, &[(0, 300, 1200, -40)])).unwrap();

    let json = serde_json::to_value(pipeline.snapshot()).unwrap();
    assert_eq!(json["open"][0]["id"], "T1");
    assert_eq!(json["open"][0]["status"], "Active");
    assert_eq!(json["open"][0]["first_seen"], "2024-06-01T14:30:00.000");
    assert_eq!(json["fastest_speed_mm_s"], 40.0);
    assert_eq!(json["metrics"]["processed"], 1);
}
