//! Warning sink for recoverable failures.

use parking_lot::Mutex;

/// Fire-and-forget channel for failures the cache recovers from locally.
pub trait WarningSink: Send + Sync {
    fn report_warning(&self, message: &str);
}

/// Emits warnings through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn report_warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Keeps every warning in memory.
#[derive(Debug, Default)]
pub struct RecordingWarnings {
    messages: Mutex<Vec<String>>,
}

impl RecordingWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl WarningSink for RecordingWarnings {
    fn report_warning(&self, message: &str) {
        tracing::warn!("{}", message);
        self.messages.lock().push(message.to_string());
    }
}
