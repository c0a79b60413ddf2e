//! Transport abstraction for slice data requests
//!
//! Provides a unified interface for fetching raw payloads with multiple backends:
//! - HTTP (production, reqwest)
//! - In-memory mock (testing)

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{synthetic_view, CallHistoryEntry, MockFailure, MockTransport};

use async_trait::async_trait;
use bytes::Bytes;
use voxstream_core::StreamResult;

/// Transport trait - asynchronous fetch of a complete payload by URL
///
/// Implementations must be thread-safe (Send + Sync) and support concurrent
/// requests. The cache never cancels a request once issued; stale results are
/// dropped by the caller instead.
///
/// # Error Handling
///
/// - `StreamError::Transport` - the request did not complete successfully
///   (connection failure, non-success status, timeout)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full response body for `url`
    async fn fetch(&self, url: &str) -> StreamResult<Bytes>;
}
