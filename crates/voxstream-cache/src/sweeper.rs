//! Eviction sweeper
//!
//! Prefetching runs ahead of playback without bound; the sweeper brings the
//! resident set back down to a window of `buffer_l2_size` sections around the
//! playback position. Sections are treated as a ring so that looping playback
//! keeps the start of the volume warm near the end.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use voxstream_core::BufferSizing;

use crate::position::PositionProvider;
use crate::segment::{SegmentSource, SharedStore};
use crate::stats::StreamCounters;

/// Whether segment `index` survives a sweep centered on `section`.
///
/// The window spans `buffer_l2_size / 2` sections ahead of `section` and
/// `(buffer_l2_size - 1) / 2` behind it, wrapping around the
/// `ceil(time_length / buffer_size)` sections of the volume.
pub fn window_contains(index: u64, section: u64, sizing: BufferSizing, time_length: u64) -> bool {
    let ring = sizing.segment_count(time_length);
    if index >= ring {
        return false;
    }

    let slots = sizing.buffer_l2_size();
    if slots >= ring {
        return true;
    }

    let ahead = slots / 2;
    let back = (slots - 1) / 2;
    let forward = (index + ring - section % ring) % ring;
    forward <= ahead || ring - forward <= back
}

/// Periodically evicts segments far from the playback position.
pub struct EvictionSweeper {
    store: SharedStore,
    position: Arc<dyn PositionProvider>,
    counters: Arc<StreamCounters>,
    source: SegmentSource,
}

impl EvictionSweeper {
    pub fn new(
        store: SharedStore,
        position: Arc<dyn PositionProvider>,
        counters: Arc<StreamCounters>,
        source: SegmentSource,
    ) -> Self {
        Self {
            store,
            position,
            counters,
            source,
        }
    }

    /// Run one sweep; returns the number of segments evicted.
    pub fn sweep(&self) -> usize {
        let sizing = self.source.sizing();
        let time_length = self.source.time_length();

        let evicted = {
            let mut store = self.store.lock();
            if store.len() as u64 <= sizing.buffer_l2_size() {
                return 0;
            }
            let section = sizing.segment_of(self.position.current_position().time_point);
            store.retain(|index| window_contains(index, section, sizing, time_length))
        };

        if evicted > 0 {
            tracing::debug!(evicted, "Evicted segments outside playback window");
            self.counters.record_evicted(evicted);
        }
        evicted
    }

    /// Spawn the recurring sweep loop.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
