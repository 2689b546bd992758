//! Frame timing histograms.
//! Each named stage keeps its most recent samples in a ring buffer and
//! reports p50/p95/p99 on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::audio::RingBuffer;

/// Samples retained per metric.
const HISTOGRAM_CAPACITY: usize = 1024;

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// End the span, recording elapsed duration in microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

fn percentile(ring: &RingBuffer<f64>, p: f64) -> f64 {
    if ring.is_empty() {
        return 0.0;
    }
    let mut sorted = ring.peek(ring.len());
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Stores histograms for all named metrics.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, RingBuffer<f64>>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(HISTOGRAM_CAPACITY)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity,
        }
    }

    /// Record a sample for the named metric.
    pub fn record(&self, name: &'static str, value: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| RingBuffer::new(self.ring_capacity))
            .push(value);
        tracing::trace!(metric = name, value, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Percentile (0-100) of the retained samples, 0 if none.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists.get(name).map(|ring| percentile(ring, p)).unwrap_or(0.0)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50: percentile(ring, 50.0),
                        p95: percentile(ring, 95.0),
                        p99: percentile(ring, 99.0),
                        count: ring.len(),
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: usize,
}

/// Well-known metric names.
pub mod metric_names {
    /// Microseconds spent draining audio per frame.
    pub const CAPTURE_US: &str = "t_capture_us";
    pub const RENDER_US: &str = "t_render_us";
    pub const TRANSMIT_US: &str = "t_transmit_us";
    pub const FRAME_US: &str = "t_frame_us";
    /// Audio blocks ingested per frame.
    pub const BLOCKS_PER_FRAME: &str = "blocks_per_frame";
    /// Capture failures replaced by silence.
    pub const CAPTURE_FAILURES: &str = "capture_failures";
}
