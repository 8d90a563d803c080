mod common;

use common::{config, ingest};
use radarcore::processing::{HandoffQueue, TrackEvent};
use radarcore::telemetry::MetricsRecorder;
use radarcore::Pipeline;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[test]
fn dropped_batches_never_reach_the_tracker() {
    let metrics = Arc::new(MetricsRecorder::new());
    let queue = HandoffQueue::new(2, metrics.clone());
    for i in 0..5 {
        // each batch is far from the others, so each would open its own track
        queue.push(ingest(100 * i, &[(0, -12000 + 6000 * i as i32, 2000, 0)]));
    }
    assert_eq!(queue.dropped(), 3);
    assert_eq!(queue.len(), 2);
    assert_eq!(metrics.snapshot().dropped_frames, 3);

    let mut pipeline = Pipeline::new(config(), None, metrics.clone()).unwrap();
    let stop = AtomicBool::new(true);
    let mut births = Vec::new();
    pipeline.consume(&queue, &stop, |_, events| {
        for event in events {
            if let TrackEvent::Created { sample, .. } = event {
                births.push(sample.x_mm);
            }
        }
    });

    assert_eq!(births, vec![6000.0, 12000.0]);
    assert_eq!(metrics.snapshot().processed, 2);
    assert!(queue.is_empty());
    assert_eq!(pipeline.tracker().open_count(), 0);
}
