use serde::Serialize;
use std::sync::Mutex;

/// Diagnostic counters shared between the producer and consumer paths.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub decode_errors: usize,
    pub dropped_frames: usize,
    pub persistence_failures: usize,
    pub tracking_faults: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn bump(&self, update: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            update(&mut metrics);
        }
    }

    pub fn record_processed(&self) {
        self.bump(|m| m.processed += 1);
    }

    pub fn record_decode_error(&self) {
        self.bump(|m| m.decode_errors += 1);
    }

    pub fn record_dropped(&self) {
        self.bump(|m| m.dropped_frames += 1);
    }

    pub fn record_persistence_failure(&self) {
        self.bump(|m| m.persistence_failures += 1);
    }

    pub fn record_tracking_fault(&self) {
        self.bump(|m| m.tracking_faults += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let metrics = MetricsRecorder::new();
        metrics.record_processed();
        metrics.record_processed();
        metrics.record_dropped();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.dropped_frames, 1);
        assert_eq!(snapshot.decode_errors, 0);
    }
}
