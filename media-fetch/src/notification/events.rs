//! Operational diagnostic events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Error;
use crate::domain::RequesterId;
use crate::downloader::ErrorClassification;

/// Longest snippet of raw error text carried by an event, in characters.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Full detail of one failure, routed to operators rather than requesters.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    /// Module key of the source, or `unrouted` when routing failed.
    pub source: String,
    pub error_type: &'static str,
    pub classification: Option<ErrorClassification>,
    pub locator: Option<String>,
    pub requester: Option<RequesterId>,
    pub snippet: String,
    pub occurred_at: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn from_error(
        source: impl Into<String>,
        requester: Option<RequesterId>,
        locator: Option<&str>,
        error: &Error,
    ) -> Self {
        Self {
            source: source.into(),
            error_type: error.error_type(),
            classification: error.classification(),
            locator: locator.map(String::from),
            requester,
            snippet: truncate_snippet(&error.to_string()),
            occurred_at: Utc::now(),
        }
    }

    /// Events with the same key are deduplicated within a window.
    pub fn dedup_key(&self) -> (String, &'static str) {
        (self.source.clone(), self.error_type)
    }
}

fn truncate_snippet(text: &str) -> String {
    match text.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
