//! Segment sizing derived from volume dimensions.

use serde::{Deserialize, Serialize};

use crate::config::SizingConfig;
use crate::types::VolumeDimensions;

/// Segment geometry for one session, fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSizing {
    /// Time points carried by one segment
    buffer_size: u64,
    /// Segments allowed to stay resident after a sweep
    buffer_l2_size: u64,
}

impl BufferSizing {
    /// Derives sizing from the largest plane of the volume.
    ///
    /// The segment length grows until one segment first exceeds
    /// `fetch_payload_target` values. The resident segment count is the
    /// largest power of two whose segments fit in `memory_budget`.
    #[must_use]
    pub fn derive(dims: &VolumeDimensions, budget: &SizingConfig) -> Self {
        let edge = dims.max_spatial().max(1);
        let values_per_point = edge.saturating_mul(edge);

        // Smallest length whose payload exceeds the target
        let buffer_size = (budget.fetch_payload_target / values_per_point).saturating_add(1);

        let segment_values = buffer_size.saturating_mul(values_per_point);
        let mut buffer_l2_size: u64 = 1;
        while segment_values.saturating_mul(buffer_l2_size) <= budget.memory_budget {
            buffer_l2_size = buffer_l2_size.saturating_mul(2);
            if buffer_l2_size == u64::MAX {
                break;
            }
        }
        buffer_l2_size = (buffer_l2_size / 2).max(1);

        tracing::debug!(
            values_per_point,
            buffer_size,
            buffer_l2_size,
            "Derived segment sizing"
        );

        Self {
            buffer_size,
            buffer_l2_size,
        }
    }

    /// Explicit sizing, clamped to at least one.
    #[must_use]
    pub fn fixed(buffer_size: u64, buffer_l2_size: u64) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            buffer_l2_size: buffer_l2_size.max(1),
        }
    }

    #[must_use]
    pub const fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    #[must_use]
    pub const fn buffer_l2_size(&self) -> u64 {
        self.buffer_l2_size
    }

    /// Segment holding `time_point`.
    #[must_use]
    pub const fn segment_of(&self, time_point: u64) -> u64 {
        time_point / self.buffer_size
    }

    /// Offset of `time_point` inside its segment.
    #[must_use]
    pub const fn offset_in_segment(&self, time_point: u64) -> u64 {
        time_point % self.buffer_size
    }

    /// First time point of `segment`.
    #[must_use]
    pub const fn first_time_point(&self, segment: u64) -> u64 {
        segment.saturating_mul(self.buffer_size)
    }

    /// Number of segments covering `time_length` points (the last may be short).
    #[must_use]
    pub const fn segment_count(&self, time_length: u64) -> u64 {
        time_length.div_ceil(self.buffer_size)
    }

    /// Whether prefetching whole segments is worthwhile at all.
    #[must_use]
    pub const fn supports_buffering(&self) -> bool {
        self.buffer_size > 1
    }
}
