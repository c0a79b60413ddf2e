//! Central metrics registry and metric definitions
//!
//! Prometheus metrics for the streaming cache, registered lazily on first
//! access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

/// Slice view requests by source (`segment` or `fallback`)
pub static VIEW_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "voxstream_view_requests_total",
        "Total number of slice view requests",
        &["source"]
    )
    .expect("Failed to register view request counter")
});

/// Background view requests by result (`hit` or `miss`)
pub static BACKGROUND_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "voxstream_background_requests_total",
        "Total number of background view requests",
        &["result"]
    )
    .expect("Failed to register background request counter")
});

/// Completed prefetch fetches by outcome (`stored`, `stale`, `failed`)
pub static PREFETCH_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "voxstream_prefetch_fetches_total",
        "Total number of completed prefetch fetches",
        &["outcome"]
    )
    .expect("Failed to register prefetch fetch counter")
});

/// Segments removed by the eviction sweeper
pub static SEGMENTS_EVICTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "voxstream_segments_evicted_total",
        "Total number of segments evicted by the sweeper"
    )
    .expect("Failed to register eviction counter")
});

/// Fetch latency by kind (`prefetch`, `fallback`, `background`, `region`)
pub static FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "voxstream_fetch_duration_seconds",
        "Fetch duration in seconds",
        &["kind"],
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register fetch duration histogram")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = VIEW_REQUESTS.with_label_values(&["segment"]).get();
        VIEW_REQUESTS.with_label_values(&["segment"]).inc();
        assert!(VIEW_REQUESTS.with_label_values(&["segment"]).get() > before);
    }

    #[test]
    fn test_histogram_observes() {
        FETCH_DURATION.with_label_values(&["prefetch"]).observe(0.02);
        assert!(FETCH_DURATION.with_label_values(&["prefetch"]).get_sample_count() >= 1);
    }
}
