use radarcore::pipeline::{PipelineSnapshot, TrackView};
use radarcore::processing::TrackSummary;
use radarcore::telemetry::MetricsSnapshot;
use serde::Serialize;

/// Everything the presentation consumer renders.
#[derive(Debug, Clone, Serialize, Default)]
pub struct VisualizationModel {
    pub open: Vec<TrackView>,
    pub recent: Vec<TrackSummary>,
    pub fastest_speed_mm_s: f64,
    pub trail_on: bool,
    pub trail_duration: u32,
    pub diagnostics: MetricsSnapshot,
    pub status: String,
}

impl VisualizationModel {
    pub fn new(trail_on: bool, trail_duration: u32) -> Self {
        Self {
            trail_on,
            trail_duration,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, snapshot: PipelineSnapshot) {
        self.open = snapshot.open;
        self.recent = snapshot.recent;
        self.fastest_speed_mm_s = snapshot.fastest_speed_mm_s;
        self.diagnostics = snapshot.metrics;
    }
}
