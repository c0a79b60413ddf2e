//! Prefetch scheduler
//!
//! Each tick looks at the playback position and requests at most one segment
//! ahead of it. Completions run as their own tasks and carry the batch id that
//! was live when they were issued; the store drops anything that arrives after
//! the batch moved on.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use voxstream_core::config::PrefetchConfig;
use voxstream_core::{metrics, BatchId, SliceRequest, StreamError, StreamResult};

use crate::context::Collaborators;
use crate::position::PositionProvider;
use crate::segment::{FetchOutcome, Segment, SegmentSource, SegmentStore, SharedStore};
use crate::stats::StreamCounters;

/// Section the scheduler should fetch next, if any.
///
/// Candidates start at `ceil(time_point / buffer_size)` and run for
/// `look_ahead + 1` steps, each capped at `floor(time_length / buffer_size)`.
/// Sections starting at or past the end of the volume are skipped. The first
/// candidate that is neither resident nor in flight wins.
///
/// Steps past the cap would repeat the capped section, so the scan stops there.
pub fn next_section(
    store: &SegmentStore,
    source: &SegmentSource,
    time_point: u64,
    look_ahead: u64,
) -> Option<u64> {
    let sizing = source.sizing();
    let current = time_point.div_ceil(sizing.buffer_size());
    let max_sections = source.max_sections();
    let steps = look_ahead.min(max_sections.saturating_sub(current));

    (0..=steps)
        .map(|step| current.saturating_add(step).min(max_sections))
        .filter(|&section| sizing.first_time_point(section) < source.time_length())
        .find(|&section| !store.contains(section) && !store.is_in_flight(section))
}

/// Issues segment fetches ahead of playback.
pub struct PrefetchScheduler {
    store: SharedStore,
    collaborators: Collaborators,
    position: Arc<dyn PositionProvider>,
    counters: Arc<StreamCounters>,
    source: SegmentSource,
    look_ahead: u64,
    max_in_flight: usize,
}

impl PrefetchScheduler {
    pub fn new(
        store: SharedStore,
        collaborators: Collaborators,
        position: Arc<dyn PositionProvider>,
        counters: Arc<StreamCounters>,
        source: SegmentSource,
        config: &PrefetchConfig,
    ) -> Self {
        Self {
            store,
            collaborators,
            position,
            counters,
            source,
            look_ahead: config.look_ahead,
            max_in_flight: config.max_in_flight,
        }
    }

    /// Run one scheduling step.
    ///
    /// Returns the completion task of the fetch issued by this tick, or
    /// `None` when the in-flight cap is reached or every candidate is
    /// already resident or in flight.
    pub fn tick(&self) -> Option<JoinHandle<FetchOutcome>> {
        if self.store.lock().in_flight_len() >= self.max_in_flight {
            tracing::trace!("In-flight cap reached, skipping tick");
            return None;
        }

        let position = self.position.current_position();

        let (section, batch, request) = {
            let mut store = self.store.lock();
            if store.in_flight_len() >= self.max_in_flight {
                return None;
            }
            let section =
                next_section(&store, &self.source, position.time_point, self.look_ahead)?;
            let request = self.source.request_for(section, position.voxel)?;
            let batch = store.try_begin_fetch(section)?;
            (section, batch, request)
        };

        tracing::debug!(
            section,
            batch = %batch,
            from = request.from,
            to = request.to,
            "Prefetching segment"
        );

        let job = FetchJob {
            store: Arc::clone(&self.store),
            collaborators: self.collaborators.clone(),
            counters: Arc::clone(&self.counters),
            url: request.to_url(self.source.data_url()),
            request,
            section,
            batch,
        };
        Some(tokio::spawn(job.run()))
    }

    /// Spawn the recurring tick loop.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                // Completion tasks run detached; their outcome is recorded in the counters.
                let _ = self.tick();
            }
        })
    }
}

/// One outstanding segment fetch.
struct FetchJob {
    store: SharedStore,
    collaborators: Collaborators,
    counters: Arc<StreamCounters>,
    url: String,
    request: SliceRequest,
    section: u64,
    batch: BatchId,
}

impl FetchJob {
    async fn run(self) -> FetchOutcome {
        let outcome = match self.fetch_and_store().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.collaborators
                    .warnings
                    .report_warning(&format!("Prefetch of segment {} failed: {e}", self.section));
                self.store.lock().release(self.section, self.batch);
                FetchOutcome::Failed
            }
        };

        if outcome == FetchOutcome::Stale {
            tracing::debug!(
                section = self.section,
                batch = %self.batch,
                "Discarded stale segment"
            );
        }

        self.counters.record_prefetch(outcome);
        outcome
    }

    async fn fetch_and_store(&self) -> StreamResult<FetchOutcome> {
        let started = Instant::now();
        let payload = self.collaborators.transport.fetch(&self.url).await;
        metrics::FETCH_DURATION
            .with_label_values(&["prefetch"])
            .observe(started.elapsed().as_secs_f64());
        let payload = payload?;

        if !self.is_live() {
            self.store.lock().release(self.section, self.batch);
            return Ok(FetchOutcome::Stale);
        }

        let frames = self.collaborators.decoder.decode_frames(payload).await?;
        let expected = self.request.len();
        if frames.len() as u64 != expected {
            return Err(StreamError::decode(format!(
                "expected {expected} frames for {}, got {}",
                self.url,
                frames.len()
            )));
        }

        let segment = Segment::new(self.section, self.request.from, frames);
        Ok(self.store.lock().complete(self.batch, segment))
    }

    fn is_live(&self) -> bool {
        self.store.lock().is_live(self.batch)
    }
}
