//! Configuration management for voxstream
//!
//! Supports:
//! - YAML/TOML/JSON configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure for a streaming session
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StreamConfig {
    #[serde(default)]
    pub prefetch: PrefetchConfig,

    #[serde(default)]
    pub eviction: EvictionConfig,

    #[serde(default)]
    pub sizing: SizingConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub decode: DecodeConfig,
}

impl StreamConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file specified by VOXSTREAM_CONFIG env var
    /// 3. ./config/voxstream
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        if let Ok(config_path) = std::env::var("VOXSTREAM_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/voxstream").required(false));

        // Example: VOXSTREAM__PREFETCH__LOOK_AHEAD=20
        builder = builder.add_source(
            Environment::with_prefix("VOXSTREAM")
                .separator("__")
                .try_parsing(true),
        );

        let config: StreamConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("prefetch.look_ahead", 10)?
            .set_default("prefetch.max_in_flight", 2)?
            .set_default("prefetch.tick_interval_ms", 4)?
            .set_default("eviction.interval_factor", 20)?
            .set_default("sizing.fetch_payload_target", 50_000)?
            .set_default("sizing.memory_budget", 157_286_400)?
            .set_default("transport.request_timeout_secs", 30)?
            .set_default("decode.mode", "auto")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefetch.max_in_flight == 0 || self.prefetch.max_in_flight > MAX_IN_FLIGHT_CAP {
            return Err(ConfigError::Message(format!(
                "prefetch.max_in_flight must be between 1 and {MAX_IN_FLIGHT_CAP}"
            )));
        }

        if self.prefetch.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "prefetch.tick_interval_ms must be > 0".to_string(),
            ));
        }

        if self.eviction.interval_factor == 0 {
            return Err(ConfigError::Message(
                "eviction.interval_factor must be > 0".to_string(),
            ));
        }

        if self.sizing.fetch_payload_target == 0 || self.sizing.memory_budget == 0 {
            return Err(ConfigError::Message(
                "sizing.fetch_payload_target and sizing.memory_budget must be > 0".to_string(),
            ));
        }

        if self.transport.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "transport.request_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: StreamConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}

/// Upper bound on outstanding prefetch requests
pub const MAX_IN_FLIGHT_CAP: usize = 2;

/// Prefetch scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrefetchConfig {
    /// Sections scanned ahead of the playback section (the scan covers `look_ahead + 1`)
    pub look_ahead: u64,

    /// Outstanding prefetch requests allowed at once, at most [`MAX_IN_FLIGHT_CAP`]
    pub max_in_flight: usize,

    /// Delay between scheduler ticks
    pub tick_interval_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            look_ahead: 10,
            max_in_flight: 2,
            tick_interval_ms: 4,
        }
    }
}

impl PrefetchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Eviction sweeper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvictionConfig {
    /// Sweep interval as a multiple of the playback rate
    pub interval_factor: u32,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            interval_factor: 20,
        }
    }
}

impl EvictionConfig {
    /// Sweep interval for a given playback rate (time per frame)
    pub fn sweep_interval(&self, playback_rate: Duration) -> Duration {
        // interval(0) panics in tokio
        (playback_rate * self.interval_factor).max(Duration::from_millis(1))
    }
}

/// Buffer sizing budgets, counted in plane values
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SizingConfig {
    /// Upper bound on values carried by a single prefetch response
    pub fetch_payload_target: u64,

    /// Upper bound on values resident across all cached segments
    pub memory_budget: u64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            fetch_payload_target: 50_000,
            memory_budget: 157_286_400,
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where payload decoding runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Pick based on the runtime the session starts on
    #[default]
    Auto,
    /// Decode on the calling task
    Inline,
    /// Decode on the blocking thread pool
    BlockingPool,
}

/// Decoder selection
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DecodeConfig {
    #[serde(default)]
    pub mode: DecodeMode,
}
