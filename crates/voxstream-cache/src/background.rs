//! Background-frame cache
//!
//! The anatomical background does not change with time, so one view per voxel
//! is enough. Only the most recently fetched voxel is kept: moving the cursor
//! replaces the entry.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use voxstream_core::{SliceView, Voxel};

/// Single-entry cache of background views keyed by voxel.
#[derive(Debug)]
pub struct BackgroundCache {
    entries: Mutex<LruCache<String, Arc<SliceView>>>,
}

impl BackgroundCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::MIN)),
        }
    }

    pub fn get(&self, voxel: &Voxel) -> Option<Arc<SliceView>> {
        self.entries.lock().get(&voxel.cache_key()).cloned()
    }

    /// Store `view` for `voxel`, displacing any other voxel.
    pub fn insert(&self, voxel: &Voxel, view: Arc<SliceView>) {
        self.entries.lock().put(voxel.cache_key(), view);
    }

    pub fn contains(&self, voxel: &Voxel) -> bool {
        self.entries.lock().contains(&voxel.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BackgroundCache {
    fn default() -> Self {
        Self::new()
    }
}
