//! Session collaborators and their configuration.

use std::sync::Arc;
use voxstream_core::{BufferSizing, StreamConfig};

use crate::decode::{decoder_for, Decoder};
use crate::transport::Transport;
use crate::warnings::{TracingWarnings, WarningSink};

/// Resolved collaborators shared by a session and its background tasks.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub decoder: Arc<dyn Decoder>,
    pub warnings: Arc<dyn WarningSink>,
}

/// Everything a session needs besides its data sources.
///
/// The decoder is resolved when a session is initialized, so `Auto` mode
/// inspects the runtime the session actually starts on.
#[derive(Clone)]
pub struct StreamContext {
    transport: Arc<dyn Transport>,
    decoder: Option<Arc<dyn Decoder>>,
    warnings: Arc<dyn WarningSink>,
    config: StreamConfig,
    sizing: Option<BufferSizing>,
}

impl StreamContext {
    /// Context with default configuration, tracing warnings and an auto-selected decoder.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            decoder: None,
            warnings: Arc::new(TracingWarnings),
            config: StreamConfig::default(),
            sizing: None,
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `decoder` regardless of the configured decode mode.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Use fixed sizing instead of deriving it from the volume dimensions.
    pub fn with_sizing(mut self, sizing: BufferSizing) -> Self {
        self.sizing = Some(sizing);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub(crate) fn sizing_override(&self) -> Option<BufferSizing> {
        self.sizing
    }

    pub(crate) fn resolve(&self) -> Collaborators {
        Collaborators {
            transport: Arc::clone(&self.transport),
            decoder: self
                .decoder
                .clone()
                .unwrap_or_else(|| decoder_for(self.config.decode.mode)),
            warnings: Arc::clone(&self.warnings),
        }
    }
}
