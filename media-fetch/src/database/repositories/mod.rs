//! Repository layer for database access.

pub mod credential_store;
pub mod media_cache;
pub mod toggle;

pub use credential_store::SqlxCredentialStore;
pub use media_cache::{MediaCacheRepository, SqlxMediaCacheRepository};
pub use toggle::SqlxToggleStore;
