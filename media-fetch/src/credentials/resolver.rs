//! Credential source resolver.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::store::CredentialStore;
use super::types::{CredentialScope, CredentialSource};
use crate::Result;
use crate::domain::RequesterId;

/// Finds the credential material to use for a requester and source.
///
/// Checks the requester's own material first, then the global layer. Blank
/// blobs are treated as "no credentials".
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        requester: RequesterId,
        source_key: &str,
    ) -> Result<Option<CredentialSource>> {
        for scope in [CredentialScope::requester(requester), CredentialScope::Global] {
            if let Some(blob) = self.store.get(scope, source_key).await?
                && !blob.trim().is_empty()
            {
                debug!(%scope, "Resolved credentials");
                return Ok(Some(CredentialSource {
                    scope,
                    source_key: source_key.to_string(),
                    blob,
                }));
            }
        }

        debug!("No credentials configured");
        Ok(None)
    }
}
