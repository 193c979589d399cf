//! Database models.
//!
//! These map directly to the tables created by the migrations.

pub mod credential;
pub mod media_cache;
pub mod toggle;

pub use credential::*;
pub use media_cache::*;
pub use toggle::*;
