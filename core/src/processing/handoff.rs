//! Bounded hand-off between the transport producer and the single consumer.
//!
//! When full, a push evicts the oldest unconsumed item and counts one
//! dropped frame. Evicted items never reach the tracker.

use crate::telemetry::metrics::MetricsRecorder;
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct HandoffQueue<T> {
    buffer: ArrayQueue<T>,
    dropped: AtomicU64,
    metrics: Arc<MetricsRecorder>,
}

impl<T> HandoffQueue<T> {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            buffer: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
            metrics,
        }
    }

    /// Never blocks. Returns the evicted item when the queue was full.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = self.buffer.force_push(item);
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_dropped();
        }
        evicted
    }

    pub fn pop(&self) -> Option<T> {
        self.buffer.pop()
    }

    /// Waits up to `timeout` for an item, spinning briefly then sleeping.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();
        loop {
            if let Some(item) = self.buffer.pop() {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_oldest() {
        let metrics = Arc::new(MetricsRecorder::new());
        let queue = HandoffQueue::new(2, metrics.clone());
        assert_eq!(queue.push(1), None);
        assert_eq!(queue.push(2), None);
        assert_eq!(queue.push(3), Some(1));
        assert_eq!(queue.push(4), Some(2));
        assert_eq!(queue.dropped(), 2);
        assert_eq!(metrics.snapshot().dropped_frames, 2);
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_timeout_returns_none_when_idle() {
        let queue: HandoffQueue<u8> = HandoffQueue::new(1, Arc::new(MetricsRecorder::new()));
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn producer_thread_hands_items_to_consumer() {
        let queue = Arc::new(HandoffQueue::new(64, Arc::new(MetricsRecorder::new())));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..32 {
                    queue.push(i);
                }
            })
        };
        let mut received = Vec::new();
        while received.len() < 32 {
            if let Some(item) = queue.pop_timeout(Duration::from_secs(1)) {
                received.push(item);
            } else {
                break;
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..32).collect::<Vec<_>>());
        assert_eq!(queue.dropped(), 0);
    }
}
