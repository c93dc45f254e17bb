use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::event::MetricEvent;
use super::metrics::{compute_snapshot, TelemetrySnapshot};
use crate::config::TelemetryConfig;

#[derive(Debug)]
pub struct TelemetryRecorder {
    monitoring: AtomicBool,
    capacity: usize,
    retention: Option<Duration>,
    sequence: AtomicU64,
    dropped_while_stopped: AtomicU64,
    overflowed: AtomicU64,
    buffer: Mutex<VecDeque<MetricEvent>>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}

impl TelemetryRecorder {
    pub fn new(config: &TelemetryConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            monitoring: AtomicBool::new(config.start_enabled),
            capacity,
            retention: config.retention(),
            sequence: AtomicU64::new(0),
            dropped_while_stopped: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
        }
    }

    /// Accepts an event if monitoring is on. Never fails: a stopped recorder
    /// drops the event, a full buffer drops its oldest event.
    pub fn record_metric(&self, mut event: MetricEvent) {
        if !self.monitoring.load(Ordering::Acquire) {
            self.dropped_while_stopped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut buffer = self.buffer.lock();
        // Sequence is assigned under the lock so buffer order == sequence order.
        event.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(retention) = self.retention {
            let now = SystemTime::now();
            while buffer.front().is_some_and(|oldest| {
                now.duration_since(oldest.timestamp)
                    .map(|age| age > retention)
                    .unwrap_or(false)
            }) {
                buffer.pop_front();
            }
        }

        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.overflowed.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
    }

    pub fn start_monitoring(&self) {
        if !self.monitoring.swap(true, Ordering::AcqRel) {
            info!("Telemetry monitoring started");
        }
    }

    pub fn stop_monitoring(&self) {
        if self.monitoring.swap(false, Ordering::AcqRel) {
            info!("Telemetry monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    pub fn dropped_while_stopped(&self) -> u64 {
        self.dropped_while_stopped.load(Ordering::Relaxed)
    }

    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Copy of the buffered events, oldest first.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.buffer.lock().iter().cloned().collect()
    }

    pub fn events_named(&self, name: &str) -> Vec<MetricEvent> {
        self.buffer
            .lock()
            .iter()
            .filter(|event| event.name == name)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        // Aggregation is pure; only the buffer read happens under the lock.
        let mut snap = compute_snapshot(&self.buffer.lock());
        snap.monitoring = self.is_monitoring();
        snap.dropped_while_stopped = self.dropped_while_stopped();
        snap.overflowed = self.overflowed();
        snap
    }

    pub fn clear(&self) {
        let mut buffer = self.buffer.lock();
        debug!(events = buffer.len(), "Telemetry buffer cleared");
        buffer.clear();
    }
}
