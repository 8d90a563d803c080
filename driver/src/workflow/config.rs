use anyhow::{bail, Context};
use radarcore::prelude::{SmoothingConfig, TrackerConfig, MAX_SMOOTHING_LEVEL, MIN_SMOOTHING_LEVEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Serial,
    Bus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub input_mode: InputMode,
    pub serial_port: String,
    pub serial_baud: u32,
    pub serial_timeout_ms: u64,
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub smoothing_on: bool,
    pub smooth_level: u8,
    pub gating_radius_mm: f64,
    pub stale_timeout_ms: u64,
    pub queue_capacity: usize,
    pub log_dir: PathBuf,
    /// Presentation only.
    pub trail_on: bool,
    /// Seconds of trail kept by the presentation consumer.
    pub trail_duration: u32,
    pub bridge_port: u16,
    pub reconnect_backoff_ms: u64,
    pub reconnect_attempts: u32,
}

impl Default for RadarConfig {
    fn default() -> Self {
        let tracker = TrackerConfig::default();
        Self {
            input_mode: InputMode::Serial,
            serial_port: "/dev/ttyUSB0".into(),
            serial_baud: 256_000,
            serial_timeout_ms: 100,
            broker: "localhost".into(),
            port: 1883,
            topic: "radar/ld2450/raw".into(),
            smoothing_on: tracker.smoothing.enabled,
            smooth_level: tracker.smoothing.level,
            gating_radius_mm: tracker.gating_radius_mm,
            stale_timeout_ms: tracker.stale_timeout_ms,
            queue_capacity: 64,
            log_dir: PathBuf::from("radar_logs"),
            trail_on: true,
            trail_duration: 10,
            bridge_port: 9000,
            reconnect_backoff_ms: 500,
            reconnect_attempts: 6,
        }
    }
}

impl RadarConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading radar config {}", path_ref.display()))?;
        let config: RadarConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing radar config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, writing the defaults there first when it does not exist.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            let defaults = Self::default();
            defaults.save(path_ref)?;
            log::info!("wrote default radar config to {}", path_ref.display());
            return Ok(defaults);
        }
        Self::load(path_ref)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("serialising radar config")?;
        fs::write(path_ref, yaml)
            .with_context(|| format!("writing radar config {}", path_ref.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_SMOOTHING_LEVEL..=MAX_SMOOTHING_LEVEL).contains(&self.smooth_level) {
            bail!(
                "smooth_level {} outside {}..={}",
                self.smooth_level,
                MIN_SMOOTHING_LEVEL,
                MAX_SMOOTHING_LEVEL
            );
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if !(self.gating_radius_mm > 0.0) {
            bail!("gating_radius_mm must be positive, got {}", self.gating_radius_mm);
        }
        if self.stale_timeout_ms == 0 {
            bail!("stale_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn to_tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            gating_radius_mm: self.gating_radius_mm,
            stale_timeout_ms: self.stale_timeout_ms,
            smoothing: SmoothingConfig::new(self.smoothing_on, self.smooth_level),
        }
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
