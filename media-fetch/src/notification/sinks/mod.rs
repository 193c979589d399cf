//! Diagnostic sinks.

mod webhook;

pub use webhook::{WebhookAuth, WebhookConfig, WebhookSink};

use async_trait::async_trait;
use tracing::warn;

use super::events::DiagnosticEvent;
use crate::Result;

#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// `suppressed` is the number of duplicates dropped for this event's key
    /// since the previous dispatch.
    async fn send(&self, event: &DiagnosticEvent, suppressed: u64) -> Result<()>;
}

/// Writes diagnostics to the `media_fetch::ops` tracing target.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DiagnosticSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &DiagnosticEvent, suppressed: u64) -> Result<()> {
        warn!(
            target: "media_fetch::ops",
            source = %event.source,
            error_type = event.error_type,
            locator = event.locator.as_deref().unwrap_or("-"),
            requester = ?event.requester,
            suppressed,
            snippet = %event.snippet,
            "Fetch failure"
        );
        Ok(())
    }
}
