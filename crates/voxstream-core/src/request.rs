//! Slice request URL contract shared with the data server.

use crate::error::{StreamError, StreamResult};
use crate::types::Voxel;

/// A request for time points `[from, to)` sliced through `voxel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRequest {
    pub from: u64,
    pub to: u64,
    pub voxel: Voxel,
}

impl SliceRequest {
    #[must_use]
    pub const fn new(from: u64, to: u64, voxel: Voxel) -> Self {
        Self { from, to, voxel }
    }

    /// Request for the single time point `time_point`.
    #[must_use]
    pub const fn single(time_point: u64, voxel: Voxel) -> Self {
        Self::new(time_point, time_point + 1, voxel)
    }

    /// Builds the request URL; the server matches this format byte for byte.
    #[must_use]
    pub fn to_url(&self, base_url: &str) -> String {
        format!(
            "{base_url}from_idx={};to_idx={};x_plane={};y_plane={};z_plane={}",
            self.from, self.to, self.voxel.x, self.voxel.y, self.voxel.z
        )
    }

    /// Recovers the request parameters from a URL built by [`SliceRequest::to_url`].
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidConfig` if any parameter is missing or malformed.
    pub fn parse(url: &str) -> StreamResult<Self> {
        let start = url
            .find("from_idx=")
            .ok_or_else(|| StreamError::invalid_config(format!("no slice request in `{url}`")))?;

        let mut from = None;
        let mut to = None;
        let mut voxel = [None; 3];
        for pair in url[start..].split(';') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| StreamError::invalid_config(format!("malformed pair `{pair}`")))?;
            let parse = || {
                value.parse::<u64>().map_err(|_| {
                    StreamError::invalid_config(format!("malformed value for `{key}`: `{value}`"))
                })
            };
            match key {
                "from_idx" => from = Some(parse()?),
                "to_idx" => to = Some(parse()?),
                "x_plane" => voxel[0] = Some(parse()?),
                "y_plane" => voxel[1] = Some(parse()?),
                "z_plane" => voxel[2] = Some(parse()?),
                _ => {}
            }
        }

        let coordinate = |value: Option<u64>, axis: &str| {
            value
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    StreamError::invalid_config(format!("missing {axis}_plane in `{url}`"))
                })
        };
        Ok(Self {
            from: from.ok_or_else(|| StreamError::invalid_config("missing from_idx"))?,
            to: to.ok_or_else(|| StreamError::invalid_config("missing to_idx"))?,
            voxel: Voxel::new(
                coordinate(voxel[0], "x")?,
                coordinate(voxel[1], "y")?,
                coordinate(voxel[2], "z")?,
            ),
        })
    }

    /// Number of time points requested.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the region label lookup URL for `voxel`.
#[must_use]
pub fn region_label_url(base_url: &str, voxel: Voxel) -> String {
    format!(
        "{base_url}x_plane={};y_plane={};z_plane={}",
        voxel.x, voxel.y, voxel.z
    )
}
