use thiserror::Error;

/// Canonical error type for volume streaming operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A fetch did not complete successfully.
    #[error("transport failure for `{url}`: {message}")]
    Transport {
        /// Request URL that failed.
        url: String,
        /// Human-readable failure reason.
        message: String,
    },

    /// Payload could not be decoded into slice frames.
    #[error("decode failure: {0}")]
    Decode(String),

    /// Requested time point lies outside the dataset.
    #[error("time point {time_point} is out of range (time length {time_length})")]
    TimePointOutOfRange {
        /// Requested time point.
        time_point: u64,
        /// Number of time points in the dataset.
        time_length: u64,
    },

    /// Operation needs a data source the session was not initialized with.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Dimensions or configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl StreamError {
    /// Creates a `Transport` variant.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a `Decode` variant.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Decode failures propagate exactly like transport failures.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Decode(_))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Convenient result alias for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
