//! media-fetch library crate.
//!
//! Download orchestration: admission control, source routing, retry
//! escalation over an external fetch engine and a two-tier result cache.

pub mod admission;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod database;
pub mod delivery;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod notification;
pub mod orchestrator;
pub mod panic_hook;
pub mod router;
pub mod services;
pub mod tasks;
pub mod utils;

pub use error::{Error, Result};
