//! End-to-end tests for the streaming cache
//!
//! Covers the behavior a renderer relies on:
//! 1. Cache correctness (resident segments serve the frames the source holds)
//! 2. Staleness (responses from a superseded batch never reach the cache)
//! 3. In-flight cap while buffering runs
//! 4. No duplicate fetches
//! 5. Eviction bound
//! 6. Single-entry background cache
//! 7. Fallback fetch, region labels and error propagation

use std::sync::Arc;
use std::time::Duration;
use voxstream_cache::transport::{synthetic_view, MockFailure, MockTransport};
use voxstream_cache::{
    FetchOutcome, InlineDecoder, RecordingWarnings, SharedPosition, StreamContext, VolumeStream,
};
use voxstream_core::{BufferSizing, StreamError, VolumeDimensions, Voxel};

const DATA_URL: &str = "/data?";
const BACKGROUND_URL: &str = "/background?";
const REGION_URL: &str = "/region?";
const PLAYBACK_RATE: Duration = Duration::from_millis(66);

struct Session {
    stream: VolumeStream,
    mock: Arc<MockTransport>,
    position: Arc<SharedPosition>,
    warnings: Arc<RecordingWarnings>,
}

fn context(
    mock: &Arc<MockTransport>,
    warnings: &Arc<RecordingWarnings>,
    sizing: BufferSizing,
) -> StreamContext {
    StreamContext::new(mock.clone())
        .with_decoder(Arc::new(InlineDecoder))
        .with_warnings(warnings.clone())
        .with_sizing(sizing)
}

fn streaming(mock: MockTransport, time_length: u64, sizing: BufferSizing) -> Session {
    let mock = Arc::new(mock);
    let warnings = Arc::new(RecordingWarnings::new());
    let position = Arc::new(SharedPosition::new(0, Voxel::new(1, 2, 3)));
    let dims = VolumeDimensions::new(time_length, 4, 4, 4).expect("valid dimensions");

    let stream = VolumeStream::init_streaming(
        context(&mock, &warnings, sizing),
        DATA_URL,
        BACKGROUND_URL,
        dims,
        PLAYBACK_RATE,
        position.clone(),
    )
    .expect("streaming session");

    Session {
        stream,
        mock,
        position,
        warnings,
    }
}

fn non_streaming(mock: MockTransport, time_length: u64) -> (VolumeStream, Arc<MockTransport>) {
    let mock = Arc::new(mock);
    let warnings = Arc::new(RecordingWarnings::new());
    let dims = VolumeDimensions::new(time_length, 4, 4, 4).expect("valid dimensions");

    let stream = VolumeStream::init_non_streaming(
        context(&mock, &warnings, BufferSizing::fixed(5, 4)),
        DATA_URL,
        BACKGROUND_URL,
        REGION_URL,
        dims,
    )
    .expect("non-streaming session");
    (stream, mock)
}

/// Tick once and wait for the fetch it issued.
async fn tick_and_wait(session: &Session) -> FetchOutcome {
    session
        .stream
        .prefetch_scheduler()
        .expect("streaming session has a scheduler")
        .tick()
        .expect("tick should issue a fetch")
        .await
        .expect("fetch task should not panic")
}

#[tokio::test]
async fn test_miss_fetches_single_point_without_caching() {
    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));

    let view = session
        .stream
        .view_at_time(7, Voxel::new(1, 2, 3))
        .await
        .expect("fallback fetch");

    assert_eq!(*view, synthetic_view(7));
    assert_eq!(
        session.mock.requested_urls(),
        vec!["/data?from_idx=7;to_idx=8;x_plane=1;y_plane=2;z_plane=3"]
    );
    assert!(
        session.stream.resident_segments().is_empty(),
        "Fallback must not populate the cache"
    );

    let stats = session.stream.stats();
    assert_eq!(stats.fallback_fetches, 1);
    assert_eq!(stats.segment_hits, 0);
}

#[tokio::test]
async fn test_resident_segment_serves_source_frames() {
    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));
    session.position.set_time_point(5);

    assert_eq!(tick_and_wait(&session).await, FetchOutcome::Stored);
    assert_eq!(session.stream.resident_segments(), vec![1]);

    for t in 5..10 {
        let view = session
            .stream
            .view_at_time(t, Voxel::new(1, 2, 3))
            .await
            .expect("resident view");
        assert_eq!(*view, synthetic_view(t), "Frame mismatch at t={t}");
    }

    // All five views came from the segment, not the network
    assert_eq!(session.mock.call_count(), 1);
    assert_eq!(session.stream.stats().segment_hits, 5);
}

#[tokio::test]
async fn test_restart_discards_pre_restart_response() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    let batch_before = session.stream.stats().batch_id;

    session.mock.hold();
    let pending = session
        .stream
        .prefetch_scheduler()
        .expect("scheduler")
        .tick()
        .expect("fetch issued");

    // Restart buffering (as on a voxel change), then stop before the workers run
    assert!(session.stream.start_buffering());
    session.stream.stop_buffering();
    assert_eq!(session.stream.stats().batch_id, batch_before + 1);

    session.mock.release();
    let outcome = pending.await.expect("fetch task");

    assert_eq!(outcome, FetchOutcome::Stale);
    assert!(
        session.stream.resident_segments().is_empty(),
        "Stale response reached the cache"
    );

    let stats = session.stream.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.prefetch_stale, 1);
}

#[tokio::test]
async fn test_stop_keeps_live_results_until_next_start() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    assert!(session.stream.start_buffering());

    session.mock.hold();
    let pending = session
        .stream
        .prefetch_scheduler()
        .expect("scheduler")
        .tick()
        .expect("fetch issued");

    // Stop without restarting: the fetch still belongs to the live batch
    session.stream.stop_buffering();
    session.mock.release();

    assert_eq!(pending.await.expect("fetch task"), FetchOutcome::Stored);
    assert_eq!(session.stream.resident_segments(), vec![0]);

    assert!(session.stream.start_buffering());
    assert!(
        session.stream.resident_segments().is_empty(),
        "Start must clear segments from the previous run"
    );
    session.stream.stop_buffering();
}

#[test]
fn test_start_buffering_outside_runtime() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    let batch = session.stream.stats().batch_id;

    assert!(!session.stream.start_buffering());
    assert!(!session.stream.is_buffering());
    assert_eq!(session.stream.stats().batch_id, batch);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_cap_while_buffering() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    session.mock.hold();

    assert!(session.stream.start_buffering());
    assert!(session.stream.is_buffering());

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(4)).await;
        assert!(session.stream.stats().in_flight <= 2, "In-flight cap exceeded");
    }
    assert_eq!(session.stream.stats().in_flight, 2);
    assert_eq!(session.mock.call_count(), 2);

    session.mock.release();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // t = 0 with look-ahead 10 covers sections 0..=10, each fetched once
    assert_eq!(session.stream.resident_segments(), (0..=10).collect::<Vec<_>>());
    let mut urls = session.mock.requested_urls();
    let total = urls.len();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), total, "A section was fetched twice");
    assert_eq!(total, 11);

    session.stream.stop_buffering();
    assert!(!session.stream.is_buffering());
}

#[tokio::test]
async fn test_no_duplicate_fetches() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    let scheduler = session.stream.prefetch_scheduler().expect("scheduler");

    session.mock.hold();
    let first = scheduler.tick().expect("first fetch");
    let second = scheduler.tick().expect("second fetch");
    session.mock.release();
    first.await.expect("first task");
    second.await.expect("second task");

    assert_eq!(tick_and_wait(&session).await, FetchOutcome::Stored);
    assert_eq!(session.stream.resident_segments(), vec![0, 1, 2]);
    assert_eq!(
        session.mock.requested_urls(),
        vec![
            "/data?from_idx=0;to_idx=5;x_plane=1;y_plane=2;z_plane=3",
            "/data?from_idx=5;to_idx=10;x_plane=1;y_plane=2;z_plane=3",
            "/data?from_idx=10;to_idx=15;x_plane=1;y_plane=2;z_plane=3",
        ]
    );
}

#[tokio::test]
async fn test_fetches_last_section_after_resident_ones() {
    // timeLength 22, bufferSize 5: maxSections 4, playback at section 2
    let session = streaming(MockTransport::synthetic(), 22, BufferSizing::fixed(5, 4));
    session.position.set_time_point(10);

    tick_and_wait(&session).await;
    tick_and_wait(&session).await;
    assert_eq!(session.stream.resident_segments(), vec![2, 3]);
    session.mock.clear_history();

    assert_eq!(tick_and_wait(&session).await, FetchOutcome::Stored);
    assert_eq!(
        session.mock.requested_urls(),
        vec!["/data?from_idx=20;to_idx=22;x_plane=1;y_plane=2;z_plane=3"]
    );

    // Nothing left to fetch
    let scheduler = session.stream.prefetch_scheduler().expect("scheduler");
    assert!(scheduler.tick().is_none());
}

#[tokio::test]
async fn test_sweep_bounds_resident_segments() {
    let session = streaming(MockTransport::synthetic(), 100, BufferSizing::fixed(5, 4));
    for _ in 0..=10 {
        tick_and_wait(&session).await;
    }
    assert_eq!(session.stream.resident_segments().len(), 11);

    // Playback moves to section 5
    session.position.set_time_point(27);
    let sweeper = session.stream.eviction_sweeper().expect("sweeper");
    assert_eq!(sweeper.sweep(), 7);

    assert_eq!(session.stream.resident_segments(), vec![4, 5, 6, 7]);
    assert_eq!(session.stream.stats().segments_evicted, 7);

    // Already within bound
    assert_eq!(sweeper.sweep(), 0);
}

#[tokio::test]
async fn test_background_cache_holds_one_voxel() {
    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));
    let a = Voxel::new(1, 2, 3);
    let b = Voxel::new(3, 2, 1);

    session.stream.background_view(a).await.expect("fetch a");
    session.stream.background_view(a).await.expect("hit a");
    assert_eq!(session.mock.call_count(), 1);

    session.stream.background_view(b).await.expect("fetch b");
    session.stream.background_view(a).await.expect("refetch a");
    assert_eq!(
        session.mock.requested_urls(),
        vec![
            "/background?from_idx=0;to_idx=1;x_plane=1;y_plane=2;z_plane=3",
            "/background?from_idx=0;to_idx=1;x_plane=3;y_plane=2;z_plane=1",
            "/background?from_idx=0;to_idx=1;x_plane=1;y_plane=2;z_plane=3",
        ]
    );

    let stats = session.stream.stats();
    assert_eq!(stats.background_hits, 1);
    assert_eq!(stats.background_misses, 3);
}

#[tokio::test]
async fn test_background_failure_leaves_cache_unchanged() {
    let mock = MockTransport::synthetic().with_failures(vec![
        MockFailure::Ok,
        MockFailure::Fail("502 Bad Gateway"),
    ]);
    let session = streaming(mock, 20, BufferSizing::fixed(5, 4));
    let a = Voxel::new(1, 2, 3);

    session.stream.background_view(a).await.expect("fetch a");
    let err = session
        .stream
        .background_view(Voxel::new(0, 0, 0))
        .await
        .unwrap_err();
    assert!(err.is_transport_failure());

    // Voxel a is still cached
    session.stream.background_view(a).await.expect("hit a");
    assert_eq!(session.mock.call_count(), 2);
}

#[tokio::test]
async fn test_fallback_failure_is_propagated() {
    let mock =
        MockTransport::synthetic().with_failures(vec![MockFailure::Fail("504 Gateway Timeout")]);
    let session = streaming(mock, 20, BufferSizing::fixed(5, 4));

    let err = session
        .stream
        .view_at_time(3, Voxel::new(1, 2, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Transport { .. }));
    assert!(session.warnings.is_empty(), "Fallback errors go to the caller, not the sink");
}

#[tokio::test]
async fn test_prefetch_failure_reports_warning() {
    let mock = MockTransport::synthetic()
        .with_failures(vec![MockFailure::Fail("500 Internal Server Error")]);
    let session = streaming(mock, 20, BufferSizing::fixed(5, 4));

    assert_eq!(tick_and_wait(&session).await, FetchOutcome::Failed);
    assert_eq!(session.warnings.len(), 1);
    assert_eq!(session.stream.stats().in_flight, 0);
    assert_eq!(session.stream.stats().prefetch_failed, 1);
}

#[tokio::test]
async fn test_time_point_out_of_range() {
    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));

    let err = session
        .stream
        .view_at_time(20, Voxel::new(0, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StreamError::TimePointOutOfRange {
            time_point: 20,
            time_length: 20
        }
    ));
    assert_eq!(session.mock.call_count(), 0);
}

#[tokio::test]
async fn test_start_buffering_no_op_cases() {
    let single = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(1, 4));
    assert!(!single.stream.start_buffering(), "One-point segments never buffer");
    assert!(!single.stream.is_buffering());

    let (stream, _) = non_streaming(MockTransport::synthetic(), 20);
    assert!(!stream.start_buffering(), "Non-streaming sessions never buffer");
    assert!(stream.prefetch_scheduler().is_none());

    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));
    assert!(session.stream.start_buffering());
    let batch = session.stream.stats().batch_id;
    assert!(!session.stream.start_buffering(), "Second start is a no-op");
    assert_eq!(session.stream.stats().batch_id, batch);
    session.stream.stop_buffering();
}

#[tokio::test]
async fn test_non_streaming_views_and_region_label() {
    let mock = MockTransport::synthetic();
    mock.insert_route("/region?x_plane=1;y_plane=2;z_plane=3", "\"Left Hippocampus\"");
    let (stream, mock) = non_streaming(mock, 20);

    let view = stream
        .view_at_time(12, Voxel::new(1, 2, 3))
        .await
        .expect("on-demand view");
    assert_eq!(*view, synthetic_view(12));

    let label = stream
        .voxel_region_label(Voxel::new(1, 2, 3))
        .await
        .expect("region label");
    assert_eq!(label, "Left Hippocampus");

    // Labels are not cached
    stream
        .voxel_region_label(Voxel::new(1, 2, 3))
        .await
        .expect("region label");
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn test_region_label_requires_region_source() {
    let session = streaming(MockTransport::synthetic(), 20, BufferSizing::fixed(5, 4));

    let err = session
        .stream
        .voxel_region_label(Voxel::new(1, 2, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::NotConfigured(_)));
    assert_eq!(session.mock.call_count(), 0);
}
