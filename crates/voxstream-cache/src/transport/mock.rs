//! Mock transport for testing
//!
//! In-memory transport with configurable failure patterns for testing the
//! prefetch pipeline without a data server.
//!
//! # Features
//!
//! - **Fixed routes**: exact URL to payload mapping
//! - **Synthetic volume**: answers any slice request with deterministic frames
//! - **Deterministic Failures**: pre-defined failure sequences
//! - **Call History**: track all requests for assertions
//! - **Gated delivery**: hold responses until released, to force late arrivals
//!
//! # Examples
//!
//! ```rust
//! use voxstream_cache::transport::{MockFailure, MockTransport, Transport};
//!
//! # async fn example() -> voxstream_core::StreamResult<()> {
//! let mock = MockTransport::synthetic().with_failures(vec![
//!     MockFailure::Fail("503 Service Unavailable"),
//!     MockFailure::Ok,
//! ]);
//!
//! let url = "/data?from_idx=0;to_idx=1;x_plane=0;y_plane=0;z_plane=0";
//! assert!(mock.fetch(url).await.is_err());
//! assert!(mock.fetch(url).await.is_ok());
//! assert_eq!(mock.call_count(), 2);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::watch;
use voxstream_core::{SliceRequest, SliceView, StreamError, StreamResult};

use super::Transport;

/// Mock failure pattern, consumed one per request.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Request fails with the given reason.
    Fail(&'static str),

    /// Request succeeds.
    Ok,
}

/// Mock call history entry.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Requested URL.
    pub url: String,

    /// Whether the request succeeded.
    pub success: bool,

    /// Time the request was issued.
    pub timestamp: Instant,
}

/// Frames served by the synthetic volume for `time_point`.
///
/// Every plane is a 2x2 block; values depend only on the time point, so a
/// view is identical whichever voxel it was requested at.
pub fn synthetic_view(time_point: u64) -> SliceView {
    let t = time_point as f32;
    SliceView {
        x: vec![vec![t, t + 0.25], vec![t + 0.5, t + 0.75]],
        y: vec![vec![-t, 1.0], vec![2.0, 3.0]],
        z: vec![vec![t * 2.0, 0.0], vec![0.0, 0.5]],
    }
}

/// Mock transport implementation for testing.
pub struct MockTransport {
    /// Exact URL routes, checked first.
    routes: RwLock<HashMap<String, Bytes>>,

    /// Serve slice requests from the synthetic volume when no route matches.
    synthetic: bool,

    /// Failure pattern queue (deterministic failures).
    failure_queue: RwLock<VecDeque<MockFailure>>,

    /// Call history (for assertions).
    call_history: RwLock<Vec<CallHistoryEntry>>,

    /// Responses are delivered only while the gate is open.
    gate: watch::Sender<bool>,
}

impl MockTransport {
    /// Create a mock with no routes; every request fails with "404 Not Found".
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: RwLock::new(HashMap::new()),
            synthetic: false,
            failure_queue: RwLock::new(VecDeque::new()),
            call_history: RwLock::new(Vec::new()),
            gate,
        }
    }

    /// Create a mock answering every slice request with [`synthetic_view`] frames.
    pub fn synthetic() -> Self {
        Self {
            synthetic: true,
            ..Self::new()
        }
    }

    /// Queue a deterministic failure pattern.
    ///
    /// Entries are consumed in order; once the queue is empty all requests succeed.
    pub fn with_failures(self, pattern: Vec<MockFailure>) -> Self {
        *self.failure_queue.write() = pattern.into();
        self
    }

    /// Serve `payload` for exactly `url`.
    pub fn insert_route(&self, url: impl Into<String>, payload: impl Into<Bytes>) {
        self.routes.write().insert(url.into(), payload.into());
    }

    /// Hold all responses (issued and future) until [`MockTransport::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Deliver held responses.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Get full call history.
    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    /// URLs requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.call_history
            .read()
            .iter()
            .map(|entry| entry.url.clone())
            .collect()
    }

    /// Number of requests issued.
    pub fn call_count(&self) -> usize {
        self.call_history.read().len()
    }

    /// Clear call history.
    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    fn respond(&self, url: &str) -> StreamResult<Bytes> {
        if let Some(MockFailure::Fail(reason)) = self.failure_queue.write().pop_front() {
            return Err(StreamError::transport(url, reason));
        }

        if let Some(payload) = self.routes.read().get(url) {
            return Ok(payload.clone());
        }

        if self.synthetic {
            let request = SliceRequest::parse(url)
                .map_err(|e| StreamError::transport(url, format!("400 Bad Request: {e}")))?;
            let frames: Vec<SliceView> = (request.from..request.to).map(synthetic_view).collect();
            let payload = serde_json::to_vec(&frames)
                .map_err(|e| StreamError::transport(url, e.to_string()))?;
            return Ok(Bytes::from(payload));
        }

        Err(StreamError::transport(url, "404 Not Found"))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str) -> StreamResult<Bytes> {
        let result = self.respond(url);

        self.call_history.write().push(CallHistoryEntry {
            url: url.to_string(),
            success: result.is_ok(),
            timestamp: Instant::now(),
        });

        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only fails if it was dropped.
        let _ = gate.wait_for(|open| *open).await;

        result
    }
}
