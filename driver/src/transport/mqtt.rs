use super::{enqueue, wait_unless_stopped, FrameSource, ReconnectPolicy};
use radarcore::prelude::TransportError;
use radarcore::processing::HandoffQueue;
use radarcore::transport::BusUnwrapper;
use radarcore::wire::{capture_now, Ingest};
use rumqttc::v5::{mqttbytes::QoS, Client, Event, Incoming, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Keep-alive also bounds how long a quiet broker delays shutdown.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Frames relayed by another host over an MQTT v5 broker.
pub struct MqttSource {
    broker: String,
    port: u16,
    topic: String,
    client_id: String,
    policy: ReconnectPolicy,
    unwrapper: BusUnwrapper,
}

impl MqttSource {
    pub fn new(broker: impl Into<String>, port: u16, topic: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            broker: broker.into(),
            port,
            topic: topic.into(),
            client_id: format!("radard-{}", std::process::id()),
            policy,
            unwrapper: BusUnwrapper::new(),
        }
    }

    /// One broker session. Failures after the broker acknowledged the
    /// connection surface as `Disconnected`, earlier ones as `Unavailable`.
    fn session(&self, queue: &HandoffQueue<Ingest>, stop: &AtomicBool) -> Result<(), TransportError> {
        let mut options = MqttOptions::new(&self.client_id, &self.broker, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        let (client, mut connection) = Client::new(options, 10);
        client
            .subscribe(&self.topic, QoS::AtMostOnce)
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;

        let mut connected = false;
        for notification in connection.iter() {
            if stop.load(Ordering::Relaxed) {
                if let Err(err) = client.disconnect() {
                    log::debug!("mqtt disconnect: {err}");
                }
                return Ok(());
            }
            match notification {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    connected = true;
                    log::info!("subscribed to {} on {}", self.topic, self.describe());
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let items = self.unwrapper.unwrap_message(&publish.payload, capture_now());
                    enqueue(queue, items);
                }
                Ok(_) => {}
                Err(err) if connected => {
                    return Err(TransportError::Disconnected(err.to_string()));
                }
                Err(err) => return Err(TransportError::Unavailable(err.to_string())),
            }
        }
        Ok(())
    }
}

impl FrameSource for MqttSource {
    fn describe(&self) -> String {
        format!("mqtt://{}:{}", self.broker, self.port)
    }

    fn run(&mut self, queue: &HandoffQueue<Ingest>, stop: &AtomicBool) -> Result<(), TransportError> {
        let mut failures = 0;
        while !stop.load(Ordering::Relaxed) {
            let err = match self.session(queue, stop) {
                Ok(()) if stop.load(Ordering::Relaxed) => break,
                Ok(()) => TransportError::Disconnected("connection closed".into()),
                Err(err) => err,
            };
            if matches!(err, TransportError::Disconnected(_)) {
                failures = 0;
            }
            failures += 1;
            let Some(delay) = self.policy.delay(failures) else {
                return Err(TransportError::Unavailable(format!(
                    "{} after {} attempts: {err}",
                    self.describe(),
                    self.policy.attempts
                )));
            };
            log::warn!("broker link lost ({err}); reconnecting in {delay:?}");
            if !wait_unless_stopped(delay, stop) {
                break;
            }
        }
        Ok(())
    }
}
