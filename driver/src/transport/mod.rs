pub mod mqtt;
pub mod serial_port;

use radarcore::prelude::TransportError;
use radarcore::processing::HandoffQueue;
use radarcore::wire::Ingest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub use mqtt::MqttSource;
pub use serial_port::SerialSource;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Producer side of the live path. Runs until `stop` is raised or the
/// transport gives up.
pub trait FrameSource: Send {
    fn describe(&self) -> String;

    fn run(&mut self, queue: &HandoffQueue<Ingest>, stop: &AtomicBool) -> Result<(), TransportError>;
}

/// Exponential reconnect schedule: `base`, `2·base`, `4·base`, ... capped at
/// 30 s, for at most `attempts` consecutive failures.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, attempts: u32) -> Self {
        Self { base, attempts }
    }

    /// Delay after the `failure`-th consecutive failure (1-based), or `None`
    /// once the budget is spent.
    pub fn delay(&self, failure: u32) -> Option<Duration> {
        if failure == 0 || failure > self.attempts {
            return None;
        }
        let factor = 1u32.checked_shl(failure - 1).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(MAX_BACKOFF))
    }
}

/// Sleeps for `duration` unless `stop` is raised first. Returns `false` when
/// interrupted.
pub(crate) fn wait_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

pub(crate) fn enqueue(queue: &HandoffQueue<Ingest>, items: Vec<Ingest>) {
    for item in items {
        if let Some(evicted) = queue.push(item) {
            log::debug!(
                "hand-off queue full, dropped frame captured at {}",
                evicted.captured_at()
            );
        }
    }
}
