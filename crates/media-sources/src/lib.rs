//! Source routing primitives for the media fetch service.
//!
//! This crate has no I/O. It answers three questions about a resource locator:
//!
//! - Is it safe to hand to the fetch engine? ([`Locator::parse`])
//! - Which source does it belong to, and which variant? ([`match_source`])
//! - Which ordered fetch configurations should be tried? ([`StrategyProfile`])

pub mod error;
pub mod locator;
pub mod media;
pub mod profile;
pub mod source;

pub use error::RouteError;
pub use locator::{DISALLOWED_CHARS, Locator};
pub use media::MediaKind;
pub use profile::{FetchOptions, FetchOverrides, PostProcessor, StrategyProfile};
pub use source::{SourceKind, SourceMatch, SourceVariant, match_source};
