//! Persistent result cache model.

use chrono::{DateTime, Utc};
use media_sources::MediaKind;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;
use crate::domain::RequesterId;

/// One delivered artifact reference, unique per (requester, locator, kind).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MediaCacheRecord {
    pub id: i64,
    pub requester_id: i64,
    pub locator: String,
    pub media_kind: String,
    /// Opaque id assigned by the delivery surface.
    pub artifact_ref: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub last_used_at: i64,
}

impl MediaCacheRecord {
    pub fn requester(&self) -> RequesterId {
        RequesterId::new(self.requester_id)
    }

    pub fn kind(&self) -> MediaKind {
        self.media_kind.parse().unwrap_or_default()
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        ms_to_datetime(self.last_used_at)
    }
}

/// Values written by an insert-or-update.
#[derive(Debug, Clone)]
pub struct MediaCacheUpsert<'a> {
    pub requester: RequesterId,
    pub locator: &'a str,
    pub kind: MediaKind,
    pub artifact_ref: &'a str,
    pub title: Option<&'a str>,
    /// Epoch milliseconds recorded as `last_used_at` (and `created_at` on insert).
    pub used_at: i64,
}
