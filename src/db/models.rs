use serde::Serialize;
use sqlx::FromRow;

/// A code present in the staging table but not yet in a downstream database,
/// as returned by `sp_sys_get_new_nocs`
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct NewCode {
    pub code: i32,
    pub description: String,
}

/// Row shape of the staging table
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct StagedCode {
    pub id: i32,
    pub code: i32,
    pub description: String,
    pub reportable: String,
    pub degree: String,
}
