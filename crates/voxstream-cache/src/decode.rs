//! Payload decoding
//!
//! Slice payloads can be large, so decoding is pushed onto the blocking
//! thread pool when the runtime has worker threads to spare. On a
//! current-thread runtime the payload is decoded in place. Both decoders sit
//! behind the same asynchronous [`Decoder`] interface.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use voxstream_core::{DecodeMode, SliceView, StreamError, StreamResult};

/// Converts a raw slice payload into frames.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Decode a JSON array of `[planeX, planeY, planeZ]` frames.
    async fn decode_frames(&self, payload: Bytes) -> StreamResult<Vec<SliceView>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Decode a payload on the current thread.
pub fn parse_frames(payload: &[u8]) -> StreamResult<Vec<SliceView>> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decodes on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDecoder;

#[async_trait]
impl Decoder for InlineDecoder {
    async fn decode_frames(&self, payload: Bytes) -> StreamResult<Vec<SliceView>> {
        parse_frames(&payload)
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Decodes on tokio's blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingPoolDecoder;

#[async_trait]
impl Decoder for BlockingPoolDecoder {
    async fn decode_frames(&self, payload: Bytes) -> StreamResult<Vec<SliceView>> {
        tokio::task::spawn_blocking(move || parse_frames(&payload))
            .await
            .map_err(|e| StreamError::decode(format!("decode task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "blocking_pool"
    }
}

/// Pick a decoder for the runtime the caller is running on.
pub fn detect_decoder() -> Arc<dyn Decoder> {
    let off_thread = Handle::try_current()
        .map(|handle| matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread))
        .unwrap_or(false);

    if off_thread {
        Arc::new(BlockingPoolDecoder)
    } else {
        Arc::new(InlineDecoder)
    }
}

/// Resolve the configured decode mode.
pub fn decoder_for(mode: DecodeMode) -> Arc<dyn Decoder> {
    match mode {
        DecodeMode::Auto => detect_decoder(),
        DecodeMode::Inline => Arc::new(InlineDecoder),
        DecodeMode::BlockingPool => Arc::new(BlockingPoolDecoder),
    }
}
