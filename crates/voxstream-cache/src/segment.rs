//! Segment cache state
//!
//! The store holds three pieces of state shared by the query facade, the
//! prefetch scheduler and the eviction sweeper:
//!
//! - resident segments keyed by segment index
//! - the in-flight request set, each entry tagged with the batch that issued it
//! - the current batch id
//!
//! A completion carrying an old batch id never touches the resident map. It
//! releases its in-flight entry only if that entry still belongs to its batch,
//! so a restart that re-requests the same index is unaffected.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use voxstream_core::{BatchId, BufferSizing, SliceRequest, SliceView, Voxel};

/// Store shared between the facade and the background tasks.
pub type SharedStore = Arc<Mutex<SegmentStore>>;

/// Decoded frames for consecutive time points.
#[derive(Debug)]
pub struct Segment {
    index: u64,
    first_time_point: u64,
    frames: Vec<Arc<SliceView>>,
}

impl Segment {
    pub fn new(index: u64, first_time_point: u64, frames: Vec<SliceView>) -> Self {
        Self {
            index,
            first_time_point,
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame for `time_point`, if this segment covers it.
    pub fn frame_at(&self, time_point: u64) -> Option<Arc<SliceView>> {
        let offset = time_point.checked_sub(self.first_time_point)?;
        let offset = usize::try_from(offset).ok()?;
        self.frames.get(offset).cloned()
    }
}

/// Result of a completed prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Segment inserted into the cache.
    Stored,
    /// Batch advanced while the fetch was in flight; payload dropped.
    Stale,
    /// Transport or decode failure; reported as a warning.
    Failed,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

/// Resident segments, in-flight requests and the batch id.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: HashMap<u64, Arc<Segment>>,
    in_flight: HashMap<u64, BatchId>,
    batch: BatchId,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Current batch id.
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn is_live(&self, batch: BatchId) -> bool {
        self.batch == batch
    }

    /// Start a new batch: advance the id and drop all segments and in-flight entries.
    pub fn restart(&mut self) -> BatchId {
        self.batch = self.batch.next();
        self.segments.clear();
        self.in_flight.clear();
        self.batch
    }

    pub fn get(&self, index: u64) -> Option<Arc<Segment>> {
        self.segments.get(&index).cloned()
    }

    pub fn contains(&self, index: u64) -> bool {
        self.segments.contains_key(&index)
    }

    pub fn is_in_flight(&self, index: u64) -> bool {
        self.in_flight.contains_key(&index)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of resident segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resident segment indices, ascending.
    pub fn indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.segments.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// In-flight segment indices, ascending.
    pub fn in_flight_indices(&self) -> Vec<u64> {
        let mut indices: Vec<u64> = self.in_flight.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Mark `index` in flight under the current batch.
    ///
    /// Returns `None` if the segment is already resident or already being fetched.
    pub fn try_begin_fetch(&mut self, index: u64) -> Option<BatchId> {
        if self.contains(index) || self.is_in_flight(index) {
            return None;
        }
        self.in_flight.insert(index, self.batch);
        Some(self.batch)
    }

    /// Release the in-flight entry for `index` if `batch` owns it.
    pub fn release(&mut self, index: u64, batch: BatchId) -> bool {
        if self.in_flight.get(&index) == Some(&batch) {
            self.in_flight.remove(&index);
            return true;
        }
        false
    }

    /// Finish a fetch started with [`SegmentStore::try_begin_fetch`].
    pub fn complete(&mut self, batch: BatchId, segment: Segment) -> FetchOutcome {
        let index = segment.index();
        self.release(index, batch);
        if !self.is_live(batch) {
            return FetchOutcome::Stale;
        }
        self.segments.insert(index, Arc::new(segment));
        FetchOutcome::Stored
    }

    /// Keep only segments for which `keep` returns true; returns the number evicted.
    pub fn retain(&mut self, mut keep: impl FnMut(u64) -> bool) -> usize {
        let before = self.segments.len();
        self.segments.retain(|index, _| keep(*index));
        before - self.segments.len()
    }
}

/// Where segments come from and how time maps onto them.
#[derive(Debug, Clone)]
pub struct SegmentSource {
    data_url: Arc<str>,
    time_length: u64,
    sizing: BufferSizing,
}

impl SegmentSource {
    pub fn new(data_url: impl Into<Arc<str>>, time_length: u64, sizing: BufferSizing) -> Self {
        Self {
            data_url: data_url.into(),
            time_length,
            sizing,
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn time_length(&self) -> u64 {
        self.time_length
    }

    pub fn sizing(&self) -> BufferSizing {
        self.sizing
    }

    /// Highest section the scheduler may target, `floor(time_length / buffer_size)`.
    pub fn max_sections(&self) -> u64 {
        self.time_length / self.sizing.buffer_size()
    }

    /// Number of non-empty sections.
    pub fn section_count(&self) -> u64 {
        self.sizing.segment_count(self.time_length)
    }

    /// Request covering `section`, or `None` if the section starts past the end.
    pub fn request_for(&self, section: u64, voxel: Voxel) -> Option<SliceRequest> {
        let from = self.sizing.first_time_point(section);
        if from >= self.time_length {
            return None;
        }
        let to = from
            .saturating_add(self.sizing.buffer_size())
            .min(self.time_length);
        Some(SliceRequest::new(from, to, voxel))
    }
}
