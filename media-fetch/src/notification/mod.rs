//! Operational diagnostics.
//!
//! Requesters only ever see a short classification-derived message. The full
//! detail of a failure goes through a bounded channel to operator-facing
//! sinks, deduplicated per (source, error type) within a time window.

mod events;
mod reporter;
mod sinks;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use events::{DiagnosticEvent, MAX_SNIPPET_CHARS};
pub use reporter::{DiagnosticFlusher, DiagnosticReporter, diagnostic_channel};
pub use sinks::{DiagnosticSink, LogSink, WebhookAuth, WebhookConfig, WebhookSink};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Queue capacity (default: 256).
    pub channel_capacity: usize,
    /// Repeats of the same (source, error type) inside this window are
    /// suppressed (default: 300s).
    pub dedup_window: Duration,
    pub webhook: Option<WebhookConfig>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            dedup_window: Duration::from_secs(300),
            webhook: None,
        }
    }
}
