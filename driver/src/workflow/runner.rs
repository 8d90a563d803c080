use crate::generator::profile::{build_frames, GeneratorConfig};
use crate::gui_bridge::bridge::GuiBridge;
use crate::transport::FrameSource;
use crate::workflow::config::RadarConfig;
use anyhow::{anyhow, Context};
use radarcore::processing::{HandoffQueue, TrackEvent};
use radarcore::replay::{verify_detail_file, ReplayEngine, ReplayReport};
use radarcore::storage::{read_detail, recent_detail_files, LogWriter};
use radarcore::telemetry::{MetricsRecorder, MetricsSnapshot};
use radarcore::transport::BusUnwrapper;
use radarcore::wire::capture_now;
use radarcore::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tracks_created: usize,
    pub tracks_closed: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Clone)]
pub struct Runner {
    config: RadarConfig,
    log_dir: PathBuf,
    metrics: Arc<MetricsRecorder>,
    bridge: Option<GuiBridge>,
}

fn tally(summary: &mut RunSummary, events: &[TrackEvent]) {
    for event in events {
        match event {
            TrackEvent::Created { .. } => summary.tracks_created += 1,
            TrackEvent::Closed(_) => summary.tracks_closed += 1,
            _ => {}
        }
    }
}

impl Runner {
    pub fn new(config: RadarConfig) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            config,
            metrics: Arc::new(MetricsRecorder::new()),
            bridge: None,
        }
    }

    pub fn with_bridge(mut self, bridge: GuiBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn open_pipeline(&self) -> anyhow::Result<Pipeline> {
        let writer = LogWriter::open(&self.log_dir)
            .with_context(|| format!("opening log directory {}", self.log_dir.display()))?;
        Pipeline::new(self.config.to_tracker_config(), Some(writer), self.metrics.clone())
            .context("reading today's track index")
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            tracks_created: 0,
            tracks_closed: 0,
            metrics: self.metrics.snapshot(),
        }
    }

    fn publish(&self, pipeline: &Pipeline) {
        if let Some(bridge) = &self.bridge {
            bridge.publish(pipeline.snapshot());
        }
    }

    /// Producer thread feeds the hand-off queue, consumer thread owns the
    /// pipeline. Returns once `stop` is raised or the transport gives up;
    /// every open track is closed either way.
    pub fn run_live(&self, mut source: Box<dyn FrameSource>, stop: Arc<AtomicBool>) -> anyhow::Result<RunSummary> {
        let queue = Arc::new(HandoffQueue::new(self.config.queue_capacity, self.metrics.clone()));
        let mut pipeline = self.open_pipeline()?;
        log::info!(
            "live capture from {}, logging to {}",
            source.describe(),
            self.log_dir.display()
        );

        let producer = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("radar-producer".into())
                .spawn(move || {
                    let outcome = source.run(&queue, &stop);
                    if let Err(err) = &outcome {
                        log::error!("transport failed: {err}");
                    }
                    stop.store(true, Ordering::SeqCst);
                    outcome
                })
                .context("spawning producer thread")?
        };

        let consumer = {
            let queue = queue.clone();
            let stop = stop.clone();
            let runner = self.clone();
            thread::Builder::new()
                .name("radar-consumer".into())
                .spawn(move || {
                    let mut summary = runner.summary();
                    pipeline.consume(&queue, &stop, |pipeline, events| {
                        tally(&mut summary, events);
                        if !events.is_empty() {
                            runner.publish(pipeline);
                        }
                    });
                    runner.publish(&pipeline);
                    summary
                })
                .context("spawning consumer thread")?
        };

        let transport = producer
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
        let mut summary = consumer
            .join()
            .map_err(|_| anyhow!("consumer thread panicked"))?;
        summary.metrics = self.metrics.snapshot();
        transport.context("live transport")?;
        Ok(summary)
    }

    /// Runs synthetic LD2450 traffic through the pipeline and writes logs.
    pub fn run_offline(&self, generator: &GeneratorConfig) -> anyhow::Result<RunSummary> {
        let frames = build_frames(generator, capture_now()).context("generating synthetic frames")?;
        let mut pipeline = self.open_pipeline()?;
        let unwrapper = BusUnwrapper::new();
        let mut summary = self.summary();

        for frame in &frames {
            for ingest in unwrapper.unwrap_message(&frame.bytes, frame.captured_at) {
                match pipeline.handle(ingest) {
                    Ok(events) => tally(&mut summary, &events),
                    Err(err) => log::error!("track log write failed, tracking continues: {err}"),
                }
            }
        }
        let closed = pipeline.shutdown().context("closing open tracks")?;
        tally(&mut summary, &closed);
        self.publish(&pipeline);
        summary.metrics = self.metrics.snapshot();
        Ok(summary)
    }

    /// Paced replay of one detail log; Ctrl+C cancels.
    pub fn run_replay(&self, path: &Path, speed: f64, stop: Arc<AtomicBool>) -> anyhow::Result<usize> {
        let rows = read_detail(path).with_context(|| format!("reading detail log {}", path.display()))?;
        let mut engine = ReplayEngine::new(rows, self.config.to_tracker_config(), speed)
            .with_context(|| format!("preparing replay of {}", path.display()))?;
        let control = engine.control();
        let finished = Arc::new(AtomicBool::new(false));

        let watcher = {
            let finished = finished.clone();
            thread::spawn(move || {
                while !finished.load(Ordering::SeqCst) {
                    if stop.load(Ordering::SeqCst) {
                        control.cancel();
                        break;
                    }
                    thread::sleep(STOP_POLL);
                }
            })
        };

        let outcome = engine.run(|frame| {
            log::info!(
                "row {} at {}: x={:.0} y={:.0} speed={:.0} deviation={:.3}",
                frame.index,
                frame.logged.timestamp.format("%H:%M:%S%.3f"),
                frame.replayed.x_mm,
                frame.replayed.y_mm,
                frame.replayed.speed_mm_s,
                frame.deviation
            );
        });
        finished.store(true, Ordering::SeqCst);
        if watcher.join().is_err() {
            log::warn!("replay watcher thread panicked");
        }
        outcome.with_context(|| format!("replaying {}", path.display()))
    }

    /// Detail log of the most recently started track under the log directory.
    pub fn latest_detail_file(&self) -> anyhow::Result<PathBuf> {
        recent_detail_files(&self.log_dir, 1)
            .with_context(|| format!("scanning {} for track logs", self.log_dir.display()))?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no track logs under {}", self.log_dir.display()))
    }

    pub fn verify(&self, path: &Path, tolerance: f64) -> anyhow::Result<ReplayReport> {
        verify_detail_file(path, self.config.to_tracker_config(), tolerance)
            .with_context(|| format!("verifying {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use radarcore::prelude::TransportError;
    use radarcore::storage::read_index;
    use radarcore::wire::{encode_frame, Ingest, RawDetectionSlot};
    use tempfile::tempdir;

    fn runner(dir: &Path) -> Runner {
        Runner::new(RadarConfig {
            log_dir: dir.to_path_buf(),
            ..RadarConfig::default()
        })
    }

    #[test]
    fn runner_executes_offline_workflow() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        let generator = GeneratorConfig {
            frames: 120,
            walkers: 3,
            seed: 5,
            ..Default::default()
        };
        let summary = runner.run_offline(&generator).unwrap();
        assert!(summary.tracks_created > 0);
        assert_eq!(summary.tracks_created, summary.tracks_closed);
        assert_eq!(summary.metrics.processed + summary.metrics.decode_errors, 120);

        let day = runner.log_dir().join(Local::now().format("%Y-%m-%d").to_string());
        let index = read_index(&day.join("track_index.csv")).unwrap();
        assert_eq!(index.len(), summary.tracks_created);
    }

    #[test]
    fn offline_logs_verify_against_replay() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        let generator = GeneratorConfig {
            frames: 80,
            walkers: 1,
            corruption: 0.0,
            seed: 21,
            ..Default::default()
        };
        assert!(runner.latest_detail_file().is_err());
        runner.run_offline(&generator).unwrap();
        let latest = runner.latest_detail_file().unwrap();
        assert_eq!(latest, recent_detail_files(dir.path(), 1).unwrap()[0]);
        let report = runner.verify(&latest, 1e-6).unwrap();
        assert!(report.is_consistent(), "{report:?}");
    }

    struct ScriptedSource {
        frames: Vec<Vec<u8>>,
    }

    impl FrameSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".into()
        }

        fn run(&mut self, queue: &HandoffQueue<Ingest>, _stop: &AtomicBool) -> Result<(), TransportError> {
            let unwrapper = BusUnwrapper::new();
            let start = capture_now();
            for (i, frame) in self.frames.iter().enumerate() {
                let at = start + chrono::Duration::milliseconds(100 * i as i64);
                for ingest in unwrapper.unwrap_message(frame, at) {
                    queue.push(ingest);
                }
            }
            thread::sleep(Duration::from_millis(200));
            Err(TransportError::EndOfStream)
        }
    }

    #[test]
    fn live_run_closes_tracks_when_transport_ends() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        let frames = (0..5)
            .map(|i| {
                let slot = RawDetectionSlot::new(0, 200 + 20 * i, 1800, 80, 360);
                encode_frame(&[slot]).unwrap().to_vec()
            })
            .collect();
        let stop = Arc::new(AtomicBool::new(false));
        let result = runner.run_live(Box::new(ScriptedSource { frames }), stop.clone());
        assert!(result.is_err());
        assert!(stop.load(Ordering::SeqCst));

        let files = recent_detail_files(dir.path(), 5).unwrap();
        assert_eq!(files.len(), 1);
        let day = files[0].parent().unwrap();
        let index = read_index(&day.join("track_index.csv")).unwrap();
        assert_eq!(index[0].duration_ms, 400);
        assert_eq!(runner.metrics.snapshot().processed, 5);
    }
}
