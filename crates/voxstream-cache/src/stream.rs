//! Query facade
//!
//! [`VolumeStream`] is the renderer-facing handle for one loaded volume. It
//! answers per-frame view requests from the segment cache, falls back to a
//! single-point fetch on a miss, and owns the background prefetch and
//! eviction tasks while buffering is active.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use voxstream_core::{
    metrics, region_label_url, BufferSizing, SessionId, SliceRequest, SliceView, StreamConfig,
    StreamError, StreamResult, VolumeDimensions, Voxel,
};

use crate::background::BackgroundCache;
use crate::context::{Collaborators, StreamContext};
use crate::position::PositionProvider;
use crate::scheduler::PrefetchScheduler;
use crate::segment::{SegmentSource, SegmentStore, SharedStore};
use crate::stats::{StreamCounters, StreamStats};
use crate::sweeper::EvictionSweeper;

/// Background tasks running while buffering is active.
struct Workers {
    scheduler: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Workers {
    fn abort(&self) {
        self.scheduler.abort();
        self.sweeper.abort();
    }
}

/// How the session obtains frames.
enum Mode {
    /// Prefetch segments ahead of a live playback position.
    Streaming {
        scheduler: Arc<PrefetchScheduler>,
        sweeper: Arc<EvictionSweeper>,
        playback_rate: Duration,
    },
    /// Every view is fetched on demand.
    NonStreaming { region_url: String },
}

/// One loaded volume and its caches.
pub struct VolumeStream {
    id: SessionId,
    mode: Mode,
    data_url: String,
    background_url: String,
    dims: VolumeDimensions,
    sizing: BufferSizing,
    config: StreamConfig,
    collaborators: Collaborators,
    store: SharedStore,
    background: BackgroundCache,
    counters: Arc<StreamCounters>,
    workers: Mutex<Option<Workers>>,
}

impl VolumeStream {
    /// Open a session that prefetches segments ahead of `position`.
    ///
    /// Buffering does not start until [`VolumeStream::start_buffering`].
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Config` if the context's configuration is invalid.
    pub fn init_streaming(
        ctx: StreamContext,
        data_url: impl Into<String>,
        background_url: impl Into<String>,
        dims: VolumeDimensions,
        playback_rate: Duration,
        position: Arc<dyn PositionProvider>,
    ) -> StreamResult<Self> {
        let data_url = data_url.into();
        let config = ctx.config().clone();
        config.validate()?;

        let sizing = ctx
            .sizing_override()
            .unwrap_or_else(|| BufferSizing::derive(&dims, &config.sizing));
        let collaborators = ctx.resolve();
        let store = SegmentStore::shared();
        let counters = Arc::new(StreamCounters::default());
        let source = SegmentSource::new(data_url.as_str(), dims.time_length, sizing);

        let scheduler = Arc::new(PrefetchScheduler::new(
            Arc::clone(&store),
            collaborators.clone(),
            Arc::clone(&position),
            Arc::clone(&counters),
            source.clone(),
            &config.prefetch,
        ));
        let sweeper = Arc::new(EvictionSweeper::new(
            Arc::clone(&store),
            position,
            Arc::clone(&counters),
            source,
        ));

        let stream = Self {
            id: SessionId::new(),
            mode: Mode::Streaming {
                scheduler,
                sweeper,
                playback_rate,
            },
            data_url,
            background_url: background_url.into(),
            dims,
            sizing,
            config,
            collaborators,
            store,
            background: BackgroundCache::new(),
            counters,
            workers: Mutex::new(None),
        };

        tracing::info!(
            session_id = %stream.id,
            time_length = dims.time_length,
            buffer_size = sizing.buffer_size(),
            buffer_l2_size = sizing.buffer_l2_size(),
            decoder = stream.collaborators.decoder.name(),
            "Streaming session initialized"
        );
        Ok(stream)
    }

    /// Open a session that fetches every view on demand.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Config` if the context's configuration is invalid.
    pub fn init_non_streaming(
        ctx: StreamContext,
        data_url: impl Into<String>,
        background_url: impl Into<String>,
        region_url: impl Into<String>,
        dims: VolumeDimensions,
    ) -> StreamResult<Self> {
        let config = ctx.config().clone();
        config.validate()?;

        let sizing = ctx
            .sizing_override()
            .unwrap_or_else(|| BufferSizing::derive(&dims, &config.sizing));

        let stream = Self {
            id: SessionId::new(),
            mode: Mode::NonStreaming {
                region_url: region_url.into(),
            },
            data_url: data_url.into(),
            background_url: background_url.into(),
            dims,
            sizing,
            config,
            collaborators: ctx.resolve(),
            store: SegmentStore::shared(),
            background: BackgroundCache::new(),
            counters: Arc::new(StreamCounters::default()),
            workers: Mutex::new(None),
        };

        tracing::info!(
            session_id = %stream.id,
            time_length = dims.time_length,
            "Non-streaming session initialized"
        );
        Ok(stream)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn dimensions(&self) -> VolumeDimensions {
        self.dims
    }

    pub fn sizing(&self) -> BufferSizing {
        self.sizing
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Planes at `time_point`.
    ///
    /// Served from a resident segment when possible. Otherwise the single
    /// time point is fetched and returned without touching the segment cache.
    /// On a hit the frame was prefetched for the playback voxel and `voxel` is
    /// not consulted.
    pub async fn view_at_time(
        &self,
        time_point: u64,
        voxel: Voxel,
    ) -> StreamResult<Arc<SliceView>> {
        self.check_time_point(time_point)?;

        let index = self.sizing.segment_of(time_point);
        let resident = self.store.lock().get(index);
        if let Some(segment) = resident {
            let view = segment.frame_at(time_point).ok_or_else(|| {
                StreamError::decode(format!(
                    "segment {index} holds no frame for time point {time_point}"
                ))
            })?;
            self.counters.record_segment_hit();
            return Ok(view);
        }

        tracing::trace!(
            session_id = %self.id,
            time_point,
            %voxel,
            "Segment miss, fetching single point"
        );
        self.counters.record_fallback();
        let request = SliceRequest::single(time_point, voxel);
        let view = self
            .fetch_single(&self.data_url, &request, "fallback")
            .await?;
        Ok(Arc::new(view))
    }

    /// Background planes for `voxel`, cached for the most recent voxel only.
    pub async fn background_view(&self, voxel: Voxel) -> StreamResult<Arc<SliceView>> {
        if let Some(view) = self.background.get(&voxel) {
            self.counters.record_background(true);
            return Ok(view);
        }

        self.counters.record_background(false);
        let request = SliceRequest::single(0, voxel);
        let view = Arc::new(
            self.fetch_single(&self.background_url, &request, "background")
                .await?,
        );
        self.background.insert(&voxel, Arc::clone(&view));
        Ok(view)
    }

    /// Anatomical region name for `voxel`.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::NotConfigured` for streaming sessions, which have
    /// no region source.
    pub async fn voxel_region_label(&self, voxel: Voxel) -> StreamResult<String> {
        let Mode::NonStreaming { region_url } = &self.mode else {
            return Err(StreamError::NotConfigured(
                "region lookup requires a non-streaming session".to_string(),
            ));
        };

        let url = region_label_url(region_url, voxel);
        let payload = self.timed_fetch(&url, "region").await?;
        Ok(parse_label(&payload))
    }

    /// Start prefetching and eviction.
    ///
    /// Returns `false` without side effects if buffering is already running,
    /// segments hold a single time point, the session is not streaming, or
    /// the caller is outside a tokio runtime.
    /// Otherwise the batch id advances and the segment cache and in-flight set
    /// are cleared before the tasks start.
    pub fn start_buffering(&self) -> bool {
        let Mode::Streaming {
            scheduler,
            sweeper,
            playback_rate,
        } = &self.mode
        else {
            tracing::debug!(
                session_id = %self.id,
                "Buffering unavailable for non-streaming session"
            );
            return false;
        };

        if !self.sizing.supports_buffering() {
            tracing::debug!(
                session_id = %self.id,
                "Segments hold one time point, buffering skipped"
            );
            return false;
        }

        if Handle::try_current().is_err() {
            tracing::warn!(session_id = %self.id, "No tokio runtime, buffering not started");
            return false;
        }

        let mut workers = self.workers.lock();
        if workers.is_some() {
            tracing::debug!(session_id = %self.id, "Buffering already running");
            return false;
        }

        let batch = self.store.lock().restart();

        let tick_interval = self.config.prefetch.tick_interval();
        let sweep_interval = self.config.eviction.sweep_interval(*playback_rate);
        *workers = Some(Workers {
            scheduler: Arc::clone(scheduler).spawn(tick_interval),
            sweeper: Arc::clone(sweeper).spawn(sweep_interval),
        });

        tracing::info!(
            session_id = %self.id,
            batch = %batch,
            ?tick_interval,
            ?sweep_interval,
            "Buffering started"
        );
        true
    }

    /// Stop the prefetch and eviction tasks.
    ///
    /// Fetches already issued still complete; the next start discards them.
    pub fn stop_buffering(&self) {
        if let Some(workers) = self.workers.lock().take() {
            workers.abort();
            tracing::info!(session_id = %self.id, "Buffering stopped");
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Scheduler driving this session, for manual ticking.
    pub fn prefetch_scheduler(&self) -> Option<Arc<PrefetchScheduler>> {
        match &self.mode {
            Mode::Streaming { scheduler, .. } => Some(Arc::clone(scheduler)),
            Mode::NonStreaming { .. } => None,
        }
    }

    /// Sweeper for this session, for manual sweeps.
    pub fn eviction_sweeper(&self) -> Option<Arc<EvictionSweeper>> {
        match &self.mode {
            Mode::Streaming { sweeper, .. } => Some(Arc::clone(sweeper)),
            Mode::NonStreaming { .. } => None,
        }
    }

    /// Resident segment indices, ascending.
    pub fn resident_segments(&self) -> Vec<u64> {
        self.store.lock().indices()
    }

    pub fn stats(&self) -> StreamStats {
        let (resident, in_flight, batch) = {
            let store = self.store.lock();
            (store.len(), store.in_flight_len(), store.batch())
        };
        StreamStats::from_counters(
            &self.counters,
            resident,
            in_flight,
            batch.get(),
            self.is_buffering(),
        )
    }

    fn check_time_point(&self, time_point: u64) -> StreamResult<()> {
        if time_point >= self.dims.time_length {
            return Err(StreamError::TimePointOutOfRange {
                time_point,
                time_length: self.dims.time_length,
            });
        }
        Ok(())
    }

    async fn fetch_single(
        &self,
        base_url: &str,
        request: &SliceRequest,
        kind: &str,
    ) -> StreamResult<SliceView> {
        let url = request.to_url(base_url);
        let payload = self.timed_fetch(&url, kind).await?;
        self.collaborators
            .decoder
            .decode_frames(payload)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StreamError::decode(format!("no frames in response from {url}")))
    }

    async fn timed_fetch(&self, url: &str, kind: &str) -> StreamResult<Bytes> {
        let started = Instant::now();
        let result = self.collaborators.transport.fetch(url).await;
        metrics::FETCH_DURATION
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());
        result
    }
}

impl Drop for VolumeStream {
    fn drop(&mut self) {
        if let Some(workers) = self.workers.get_mut().take() {
            workers.abort();
        }
    }
}

/// Region labels arrive as a JSON string; anything else is taken as plain text.
fn parse_label(payload: &[u8]) -> String {
    match serde_json::from_slice::<String>(payload) {
        Ok(label) => label,
        Err(_) => String::from_utf8_lossy(payload).trim().to_string(),
    }
}
