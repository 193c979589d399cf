use sqlx::FromRow;

/// Stored credential material.
///
/// `scope` is `global` or `requester:<id>`, see
/// [`CredentialScope`](crate::credentials::CredentialScope).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CredentialDbModel {
    pub id: i64,
    pub scope: String,
    pub source_key: String,
    pub blob: String,
    pub updated_at: i64,
}
