//! Per-session counters
//!
//! Every counter mirrors a process-wide Prometheus metric in
//! `voxstream_core::metrics`; the session copy lets callers inspect one
//! session in isolation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use voxstream_core::metrics;

use crate::segment::FetchOutcome;

#[derive(Debug, Default)]
pub struct StreamCounters {
    segment_hits: AtomicU64,
    fallback_fetches: AtomicU64,
    background_hits: AtomicU64,
    background_misses: AtomicU64,
    prefetch_stored: AtomicU64,
    prefetch_stale: AtomicU64,
    prefetch_failed: AtomicU64,
    segments_evicted: AtomicU64,
}

impl StreamCounters {
    pub fn record_segment_hit(&self) {
        self.segment_hits.fetch_add(1, Ordering::Relaxed);
        metrics::VIEW_REQUESTS.with_label_values(&["segment"]).inc();
    }

    pub fn record_fallback(&self) {
        self.fallback_fetches.fetch_add(1, Ordering::Relaxed);
        metrics::VIEW_REQUESTS.with_label_values(&["fallback"]).inc();
    }

    pub fn record_background(&self, hit: bool) {
        let (counter, label) = if hit {
            (&self.background_hits, "hit")
        } else {
            (&self.background_misses, "miss")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::BACKGROUND_REQUESTS.with_label_values(&[label]).inc();
    }

    pub fn record_prefetch(&self, outcome: FetchOutcome) {
        let counter = match outcome {
            FetchOutcome::Stored => &self.prefetch_stored,
            FetchOutcome::Stale => &self.prefetch_stale,
            FetchOutcome::Failed => &self.prefetch_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::PREFETCH_FETCHES
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_evicted(&self, count: usize) {
        if count == 0 {
            return;
        }
        let count = count as u64;
        self.segments_evicted.fetch_add(count, Ordering::Relaxed);
        metrics::SEGMENTS_EVICTED.inc_by(count);
    }
}

/// Snapshot of one session's cache activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub resident_segments: usize,
    pub in_flight: usize,
    pub batch_id: u64,
    pub buffering: bool,
    pub segment_hits: u64,
    pub fallback_fetches: u64,
    pub background_hits: u64,
    pub background_misses: u64,
    pub prefetch_stored: u64,
    pub prefetch_stale: u64,
    pub prefetch_failed: u64,
    pub segments_evicted: u64,
}

impl StreamStats {
    pub(crate) fn from_counters(
        counters: &StreamCounters,
        resident_segments: usize,
        in_flight: usize,
        batch_id: u64,
        buffering: bool,
    ) -> Self {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        Self {
            resident_segments,
            in_flight,
            batch_id,
            buffering,
            segment_hits: load(&counters.segment_hits),
            fallback_fetches: load(&counters.fallback_fetches),
            background_hits: load(&counters.background_hits),
            background_misses: load(&counters.background_misses),
            prefetch_stored: load(&counters.prefetch_stored),
            prefetch_stale: load(&counters.prefetch_stale),
            prefetch_failed: load(&counters.prefetch_failed),
            segments_evicted: load(&counters.segments_evicted),
        }
    }

    /// Share of view requests answered from resident segments.
    pub fn hit_rate(&self) -> f64 {
        let total = self.segment_hits + self.fallback_fetches;
        if total == 0 {
            return 0.0;
        }
        self.segment_hits as f64 / total as f64
    }
}
