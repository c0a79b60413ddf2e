//! Domain types shared by the cache and its collaborators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Selected voxel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct Voxel {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Voxel {
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Key under which time-invariant views for this voxel are cached.
    ///
    /// Matches the JSON array form, e.g. `[1,2,3]`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("[{},{},{}]", self.x, self.y, self.z)
    }
}

impl From<[u32; 3]> for Voxel {
    fn from([x, y, z]: [u32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Voxel> for [u32; 3] {
    fn from(voxel: Voxel) -> Self {
        [voxel.x, voxel.y, voxel.z]
    }
}

impl fmt::Display for Voxel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl FromStr for Voxel {
    type Err = StreamError;

    /// Parses `x,y,z`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_components::<u32>(s, 3, "voxel")?;
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// One 2-D cross-section, row-major.
pub type Plane = Vec<Vec<f32>>;

/// The three orthogonal planes through a voxel at one time point.
///
/// Wire form is a JSON array `[planeX, planeY, planeZ]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SliceWire", into = "SliceWire")]
pub struct SliceView {
    pub x: Plane,
    pub y: Plane,
    pub z: Plane,
}

#[derive(Serialize, Deserialize)]
struct SliceWire(Plane, Plane, Plane);

impl From<SliceWire> for SliceView {
    fn from(SliceWire(x, y, z): SliceWire) -> Self {
        Self { x, y, z }
    }
}

impl From<SliceView> for SliceWire {
    fn from(view: SliceView) -> Self {
        SliceWire(view.x, view.y, view.z)
    }
}

impl SliceView {
    /// Number of values held by the three planes.
    #[must_use]
    pub fn value_count(&self) -> usize {
        [&self.x, &self.y, &self.z]
            .iter()
            .map(|plane| plane.iter().map(Vec::len).sum::<usize>())
            .sum()
    }
}

/// Temporal and spatial extent of a volumetric time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDimensions {
    /// Number of time points.
    pub time_length: u64,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl VolumeDimensions {
    /// Creates validated dimensions.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidConfig` if any extent is zero.
    pub fn new(time_length: u64, x: u32, y: u32, z: u32) -> StreamResult<Self> {
        if time_length == 0 {
            return Err(StreamError::invalid_config("time_length must be >= 1"));
        }
        if x == 0 || y == 0 || z == 0 {
            return Err(StreamError::invalid_config(format!(
                "spatial dimensions must be >= 1, got {x}x{y}x{z}"
            )));
        }
        Ok(Self {
            time_length,
            x,
            y,
            z,
        })
    }

    /// Largest spatial extent.
    #[must_use]
    pub fn max_spatial(&self) -> u64 {
        u64::from(self.x.max(self.y).max(self.z))
    }
}

impl FromStr for VolumeDimensions {
    type Err = StreamError;

    /// Parses `t,x,y,z`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_components::<u64>(s, 4, "dimensions")?;
        let spatial = |value: u64| {
            u32::try_from(value).map_err(|_| {
                StreamError::invalid_config(format!("spatial extent {value} too large"))
            })
        };
        Self::new(parts[0], spatial(parts[1])?, spatial(parts[2])?, spatial(parts[3])?)
    }
}

/// Current playback state reported by the visualizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub time_point: u64,
    pub voxel: Voxel,
}

impl PlaybackPosition {
    #[must_use]
    pub const fn new(time_point: u64, voxel: Voxel) -> Self {
        Self { time_point, voxel }
    }
}

fn parse_components<T: FromStr>(s: &str, expected: usize, what: &str) -> StreamResult<Vec<T>> {
    let parts = s
        .split(',')
        .map(|part| part.trim().parse::<T>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StreamError::invalid_config(format!("malformed {what}: `{s}`")))?;
    if parts.len() != expected {
        return Err(StreamError::invalid_config(format!(
            "{what} needs {expected} comma-separated values, got `{s}`"
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_cache_key_matches_json() {
        let voxel = Voxel::new(1, 2, 3);
        assert_eq!(voxel.cache_key(), "[1,2,3]");
        assert_eq!(voxel.cache_key(), serde_json::to_string(&voxel).unwrap());
    }

    #[test]
    fn test_voxel_from_str() {
        assert_eq!("4, 5,6".parse::<Voxel>().unwrap(), Voxel::new(4, 5, 6));
        assert!("4,5".parse::<Voxel>().is_err());
        assert!("a,b,c".parse::<Voxel>().is_err());
    }

    #[test]
    fn test_slice_view_wire_form() {
        let json = "[[[1.0,2.0]],[[3.0]],[[4.0],[5.0]]]";
        let view: SliceView = serde_json::from_str(json).unwrap();
        assert_eq!(view.x, vec![vec![1.0, 2.0]]);
        assert_eq!(view.y, vec![vec![3.0]]);
        assert_eq!(view.z, vec![vec![4.0], vec![5.0]]);
        assert_eq!(view.value_count(), 5);
    }

    #[test]
    fn test_slice_view_rejects_two_planes() {
        assert!(serde_json::from_str::<SliceView>("[[[1.0]],[[2.0]]]").is_err());
    }

    #[test]
    fn test_dimensions_validation() {
        assert!(VolumeDimensions::new(0, 1, 1, 1).is_err());
        assert!(VolumeDimensions::new(10, 1, 0, 1).is_err());

        let dims: VolumeDimensions = "20,64,48,32".parse().unwrap();
        assert_eq!(dims.time_length, 20);
        assert_eq!(dims.max_spatial(), 64);
    }
}
