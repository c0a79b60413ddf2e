//! Core domain types, errors and configuration for voxstream.

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod request;
pub mod sizing;
pub mod types;

pub use config::{DecodeMode, StreamConfig};
pub use error::{StreamError, StreamResult};
pub use ids::{BatchId, SessionId};
pub use request::{region_label_url, SliceRequest};
pub use sizing::BufferSizing;
pub use types::{Plane, PlaybackPosition, SliceView, VolumeDimensions, Voxel};
