//! Playback position as seen by the background tasks.

use parking_lot::RwLock;
use voxstream_core::{PlaybackPosition, Voxel};

/// Read access to the visualizer's playback state.
///
/// Called by the prefetch scheduler and the eviction sweeper on every run;
/// implementations must be cheap and must not block.
pub trait PositionProvider: Send + Sync {
    fn current_position(&self) -> PlaybackPosition;
}

/// Settable playback position shared between the player loop and the cache.
#[derive(Debug)]
pub struct SharedPosition {
    inner: RwLock<PlaybackPosition>,
}

impl SharedPosition {
    pub fn new(time_point: u64, voxel: Voxel) -> Self {
        Self {
            inner: RwLock::new(PlaybackPosition::new(time_point, voxel)),
        }
    }

    pub fn set_time_point(&self, time_point: u64) {
        self.inner.write().time_point = time_point;
    }

    pub fn set_voxel(&self, voxel: Voxel) {
        self.inner.write().voxel = voxel;
    }

    /// Step playback forward one frame, wrapping at `time_length`.
    pub fn advance(&self, time_length: u64) -> u64 {
        let mut position = self.inner.write();
        position.time_point = (position.time_point + 1) % time_length.max(1);
        position.time_point
    }
}

impl PositionProvider for SharedPosition {
    fn current_position(&self) -> PlaybackPosition {
        *self.inner.read()
    }
}
