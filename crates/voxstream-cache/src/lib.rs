//! Client-side streaming cache for time-indexed volumetric slices.
//!
//! A [`VolumeStream`] serves the three orthogonal planes through a voxel at
//! any time point. While buffering, a prefetch scheduler loads whole segments
//! of consecutive time points ahead of playback and an eviction sweeper keeps
//! the resident set near the playback position.

pub mod background;
pub mod context;
pub mod decode;
pub mod position;
pub mod scheduler;
pub mod segment;
pub mod stats;
pub mod stream;
pub mod sweeper;
pub mod transport;
pub mod warnings;

pub use background::BackgroundCache;
pub use context::{Collaborators, StreamContext};
pub use decode::{decoder_for, detect_decoder, BlockingPoolDecoder, Decoder, InlineDecoder};
pub use position::{PositionProvider, SharedPosition};
pub use scheduler::{next_section, PrefetchScheduler};
pub use segment::{FetchOutcome, Segment, SegmentSource, SegmentStore, SharedStore};
pub use stats::{StreamCounters, StreamStats};
pub use stream::VolumeStream;
pub use sweeper::{window_contains, EvictionSweeper};
pub use transport::{HttpTransport, MockTransport, Transport};
pub use warnings::{RecordingWarnings, TracingWarnings, WarningSink};
