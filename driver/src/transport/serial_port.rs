use super::{enqueue, wait_unless_stopped, FrameSource, ReconnectPolicy};
use radarcore::prelude::TransportError;
use radarcore::processing::HandoffQueue;
use radarcore::transport::SerialFramer;
use radarcore::wire::Ingest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// LD2450 attached over a UART.
pub struct SerialSource {
    path: String,
    baud: u32,
    timeout: Duration,
    policy: ReconnectPolicy,
}

impl SerialSource {
    pub fn new(path: impl Into<String>, baud: u32, timeout: Duration, policy: ReconnectPolicy) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout,
            policy,
        }
    }

    fn open(&self) -> Result<Box<dyn serialport::SerialPort>, TransportError> {
        serialport::new(&self.path, self.baud)
            .timeout(self.timeout)
            .open()
            .map_err(|err| TransportError::Unavailable(format!("{}: {err}", self.path)))
    }

    /// Reads until the port fails or `stop` is raised.
    fn pump(
        &self,
        port: Box<dyn serialport::SerialPort>,
        queue: &HandoffQueue<Ingest>,
        stop: &AtomicBool,
    ) -> Result<(), TransportError> {
        let mut framer = SerialFramer::new(port);
        while !stop.load(Ordering::Relaxed) {
            let items = framer.poll()?;
            enqueue(queue, items);
        }
        Ok(())
    }
}

impl FrameSource for SerialSource {
    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.path, self.baud)
    }

    fn run(&mut self, queue: &HandoffQueue<Ingest>, stop: &AtomicBool) -> Result<(), TransportError> {
        let mut failures = 0;
        while !stop.load(Ordering::Relaxed) {
            let outcome = match self.open() {
                Ok(port) => {
                    log::info!("opened {}", self.describe());
                    failures = 0;
                    self.pump(port, queue, stop)
                }
                Err(err) => Err(err),
            };
            let err = match outcome {
                Ok(()) => break,
                Err(err) => err,
            };
            failures += 1;
            let Some(delay) = self.policy.delay(failures) else {
                return Err(TransportError::Unavailable(format!(
                    "{} after {} attempts: {err}",
                    self.path, self.policy.attempts
                )));
            };
            log::warn!("serial link lost ({err}); retrying in {delay:?}");
            if !wait_unless_stopped(delay, stop) {
                break;
            }
        }
        Ok(())
    }
}
