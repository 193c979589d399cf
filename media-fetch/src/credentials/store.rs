//! Credential persistence abstraction.
//!
//! The SQL implementation lives in the database repository layer.

use async_trait::async_trait;
use dashmap::DashMap;

use super::types::CredentialScope;
use crate::Result;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, scope: CredentialScope, source_key: &str) -> Result<Option<String>>;

    async fn set(&self, scope: CredentialScope, source_key: &str, blob: &str) -> Result<()>;

    /// Returns true if a row was removed.
    async fn remove(&self, scope: CredentialScope, source_key: &str) -> Result<bool>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: DashMap<(CredentialScope, String), String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, scope: CredentialScope, source_key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(&(scope, source_key.to_string()))
            .map(|blob| blob.value().clone()))
    }

    async fn set(&self, scope: CredentialScope, source_key: &str, blob: &str) -> Result<()> {
        self.entries
            .insert((scope, source_key.to_string()), blob.to_string());
        Ok(())
    }

    async fn remove(&self, scope: CredentialScope, source_key: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(&(scope, source_key.to_string()))
            .is_some())
    }
}
