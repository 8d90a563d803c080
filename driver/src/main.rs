use anyhow::{bail, Context};
use clap::Parser;
use env_logger::Env;
use generator::profile::GeneratorConfig;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::VisualizationModel;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use transport::{FrameSource, MqttSource, ReconnectPolicy, SerialSource};
use workflow::config::{InputMode, RadarConfig};
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod transport;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "LD2450 radar acquisition, logging and replay")]
struct Args {
    /// Load the radar config from YAML (created with defaults if missing)
    #[arg(long, default_value = "radar_config.yaml")]
    config: PathBuf,
    /// Override the configured input
    #[arg(long, value_enum)]
    input: Option<InputMode>,
    /// Run synthetic LD2450 traffic through the pipeline and write logs
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Number of synthetic frames for --offline
    #[arg(long, default_value_t = 300)]
    frames: usize,
    /// Seed for --offline traffic
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Replay a track detail CSV
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Replay speed multiplier (1-20)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Recompute the --replay log (default: the newest one) offline and
    /// compare against logged values
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Largest accepted per-field difference for --verify
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,
    /// Keep the HTTP bridge alive for the presentation layer
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Override the configured log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Raises `stop` on Ctrl+C from a dedicated signal thread.
fn spawn_signal_watcher(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::Builder::new()
        .name("signal".into())
        .spawn(move || match runtime.block_on(signal::ctrl_c()) {
            Ok(()) => {
                log::info!("Ctrl+C received, shutting down");
                stop.store(true, Ordering::SeqCst);
            }
            Err(err) => log::error!("awaiting Ctrl+C: {err}"),
        })
        .context("spawning signal thread")?;
    Ok(())
}

fn build_source(config: &RadarConfig) -> Box<dyn FrameSource> {
    let policy = ReconnectPolicy::new(config.reconnect_backoff(), config.reconnect_attempts);
    match config.input_mode {
        InputMode::Serial => Box::new(SerialSource::new(
            config.serial_port.clone(),
            config.serial_baud,
            config.serial_timeout(),
            policy,
        )),
        InputMode::Bus => Box::new(MqttSource::new(
            config.broker.clone(),
            config.port,
            config.topic.clone(),
            policy,
        )),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = RadarConfig::load_or_create(&args.config)?;
    if let Some(input) = args.input {
        config.input_mode = input;
    }
    if let Some(log_dir) = args.log_dir.clone() {
        config.log_dir = log_dir;
    }

    let mut runner = Runner::new(config.clone());
    let gui_bridge = GuiBridge::new(VisualizationModel::new(config.trail_on, config.trail_duration));
    if args.serve {
        gui_bridge.serve(config.bridge_port);
        runner = runner.with_bridge(gui_bridge.clone());
    }

    let stop = Arc::new(AtomicBool::new(false));
    spawn_signal_watcher(stop.clone())?;

    let replay = match (args.replay.clone(), args.verify) {
        (Some(path), _) => Some(path),
        (None, true) => Some(runner.latest_detail_file()?),
        (None, false) => None,
    };

    if let Some(path) = replay.as_deref() {
        if args.verify {
            let report = runner.verify(path, args.tolerance)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("rendering replay report")?
            );
            if !report.is_consistent() {
                bail!(
                    "{} of {} rows differ by more than {}",
                    report.mismatched_rows.len(),
                    report.rows,
                    args.tolerance
                );
            }
            return Ok(());
        }
        gui_bridge.publish_status(&format!("Replaying {}", path.display()));
        let emitted = runner.run_replay(path, args.speed, stop.clone())?;
        println!("Replay -> {emitted} rows from {}", path.display());
    } else if args.offline {
        let generator = GeneratorConfig {
            frames: args.frames,
            seed: args.seed,
            ..Default::default()
        };
        let summary = runner.run_offline(&generator)?;
        println!(
            "Offline run -> tracks {}, closed {}, frames {}, decode errors {}, logs in {}",
            summary.tracks_created,
            summary.tracks_closed,
            summary.metrics.processed,
            summary.metrics.decode_errors,
            runner.log_dir().display()
        );
        gui_bridge.publish_status("Offline run results ready.");
    } else {
        gui_bridge.publish_status("Live capture running (Ctrl+C to stop)...");
        let summary = runner.run_live(build_source(&config), stop.clone())?;
        println!(
            "Live run -> tracks {}, closed {}, dropped frames {}, decode errors {}, persistence failures {}",
            summary.tracks_created,
            summary.tracks_closed,
            summary.metrics.dropped_frames,
            summary.metrics.decode_errors,
            summary.metrics.persistence_failures
        );
        return Ok(());
    }

    if args.serve {
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        while !stop.load(Ordering::SeqCst) {
            thread::sleep(std::time::Duration::from_millis(200));
        }
    }

    Ok(())
}
