//! Module enable/disable flags.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::Result;

/// Feature toggle lookup keyed by module key (e.g. `youtube_audio`).
///
/// A module without an explicit flag is enabled.
#[async_trait]
pub trait ToggleStore: Send + Sync {
    async fn get(&self, module_key: &str) -> Result<bool>;

    async fn set(&self, module_key: &str, enabled: bool) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryToggleStore {
    flags: DashMap<String, bool>,
}

impl InMemoryToggleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToggleStore for InMemoryToggleStore {
    async fn get(&self, module_key: &str) -> Result<bool> {
        Ok(self.flags.get(module_key).is_none_or(|enabled| *enabled))
    }

    async fn set(&self, module_key: &str, enabled: bool) -> Result<()> {
        self.flags.insert(module_key.to_string(), enabled);
        Ok(())
    }
}
