//! Lightweight counters for the mesh controller and the management client.
//!
//! Everything is a relaxed atomic so the metrics can be shared between the
//! background loops without locking. [`MeshMetrics::snapshot`] produces a
//! plain serializable copy for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/* ---------------------------------------------------------------- *
 * Counter
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Histogram
 * ---------------------------------------------------------------- */

/// Fixed-boundary histogram; a value lands in the first bucket whose
/// boundary is greater than or equal to it.
#[derive(Debug)]
pub struct Histogram {
    boundaries: Vec<u64>,
    buckets: Vec<AtomicU64>,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(boundaries: Vec<u64>) -> Self {
        let buckets = boundaries.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            boundaries,
            buckets,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Millisecond buckets suited to one-hop probe round trips.
    pub fn round_trip_ms() -> Self {
        Self::new(vec![1, 2, 5, 10, 20, 50, 100, 200, 500, 1000])
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        match self.boundaries.iter().position(|&b| value <= b) {
            Some(idx) => {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// `(boundary, count)` pairs followed by the overflow count under `u64::MAX`.
    pub fn counts(&self) -> Vec<(u64, u64)> {
        let mut counts: Vec<(u64, u64)> = self
            .boundaries
            .iter()
            .zip(self.buckets.iter())
            .map(|(&b, bucket)| (b, bucket.load(Ordering::Relaxed)))
            .collect();
        counts.push((u64::MAX, self.overflow.load(Ordering::Relaxed)));
        counts
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::round_trip_ms()
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics for the mesh controller
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct MeshMetrics {
    // Discovery
    pub discovery_cycles: Counter,
    pub discovery_failures: Counter,
    pub peers: Gauge,

    // Probing
    pub probes_sent: Counter,
    pub probes_answered: Counter,
    pub probes_timed_out: Counter,
    pub probe_round_trip_ms: Histogram,
    pub probes_served: Counter,
    pub peers_expired: Counter,

    // Face and route maintenance
    pub faces_created: Counter,
    pub faces_destroyed: Counter,
    pub prefixes_registered: Counter,
    pub prefixes_unregistered: Counter,
    pub command_failures: Counter,

    // Group
    pub cleanups: Counter,
}

/// Point-in-time copy of [`MeshMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub discovery_cycles: u64,
    pub discovery_failures: u64,
    pub peers: u64,
    pub probes_sent: u64,
    pub probes_answered: u64,
    pub probes_timed_out: u64,
    pub probe_round_trip_avg_ms: f64,
    pub probes_served: u64,
    pub peers_expired: u64,
    pub faces_created: u64,
    pub faces_destroyed: u64,
    pub prefixes_registered: u64,
    pub prefixes_unregistered: u64,
    pub command_failures: u64,
    pub cleanups: u64,
}

impl MeshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            discovery_cycles: self.discovery_cycles.value(),
            discovery_failures: self.discovery_failures.value(),
            peers: self.peers.value(),
            probes_sent: self.probes_sent.value(),
            probes_answered: self.probes_answered.value(),
            probes_timed_out: self.probes_timed_out.value(),
            probe_round_trip_avg_ms: self.probe_round_trip_ms.average(),
            probes_served: self.probes_served.value(),
            peers_expired: self.peers_expired.value(),
            faces_created: self.faces_created.value(),
            faces_destroyed: self.faces_destroyed.value(),
            prefixes_registered: self.prefixes_registered.value(),
            prefixes_unregistered: self.prefixes_unregistered.value(),
            command_failures: self.command_failures.value(),
            cleanups: self.cleanups.value(),
        }
    }
}
