//! Application-wide error types.

use std::path::PathBuf;
use std::time::Duration;

use media_sources::RouteError;
use thiserror::Error;

use crate::downloader::ErrorClassification;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Locator rejected, invalid or unsupported.
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Module disabled: {0}")]
    ModuleDisabled(String),

    #[error("Fetch failed ({classification}): {detail}")]
    Fetch {
        classification: ErrorClassification,
        detail: String,
    },

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Fetch produced no usable output")]
    NoUsableOutput,

    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error during {op} on {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn io_path(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.into(),
            source,
        }
    }

    /// Classification of a fetch-related failure, if this is one.
    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            Self::Fetch { classification, .. } => Some(*classification),
            Self::Timeout(_) => Some(ErrorClassification::Timeout),
            Self::NoUsableOutput => Some(ErrorClassification::Unknown),
            _ => None,
        }
    }

    /// Stable snake_case name used to group operational diagnostics.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Route(RouteError::SecurityRejection(_)) => "security_rejection",
            Self::Route(RouteError::InvalidLocator(_)) => "invalid_locator",
            Self::Route(RouteError::UnsupportedSource(_)) => "unsupported_source",
            Self::ModuleDisabled(_) => "module_disabled",
            Self::Fetch { classification, .. } => classification.as_str(),
            Self::Timeout(_) => "timeout",
            Self::NoUsableOutput => "no_usable_output",
            Self::Delivery(_) => "delivery",
            Self::DatabaseSqlx(_) | Self::Migration(_) => "database",
            Self::Io(_) | Self::IoPath { .. } => "io",
            _ => "internal",
        }
    }

    /// Short message that is safe to show to a requester.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Route(RouteError::SecurityRejection(_)) => "This link contains characters that are not allowed.",
            Self::Route(RouteError::InvalidLocator(_)) => "This link is not valid.",
            Self::Route(RouteError::UnsupportedSource(_)) => "This source is not supported.",
            Self::ModuleDisabled(_) => "Downloads from this source are temporarily disabled.",
            Self::Fetch { classification, .. } => classification.user_message(),
            Self::Timeout(_) => ErrorClassification::Timeout.user_message(),
            Self::NoUsableOutput => "Nothing could be downloaded from this link.",
            _ => "Something went wrong. Please try again later.",
        }
    }
}
