use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Feature toggle row for one source module.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ModuleToggleDbModel {
    pub module_key: String,
    pub enabled: bool,
    pub updated_at: i64,
}
