//! Credential material for sources that require an authenticated session.
//!
//! - [`CredentialScope`]: which layer provides the material
//! - [`CredentialStore`]: persistence abstraction (SQL implementation in the
//!   repository layer, in-memory implementation for tests and one-shot runs)
//! - [`CredentialResolver`]: requester scope first, then global

mod resolver;
mod store;
mod types;

pub use resolver::CredentialResolver;
pub use store::{CredentialStore, InMemoryCredentialStore};
pub use types::{CredentialScope, CredentialSource};
