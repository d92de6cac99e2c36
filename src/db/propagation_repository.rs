use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{DbError, NewCode};
use crate::loader::CodePropagator;
use crate::record::Reportable;

/// Calls the reporting database's propagation procedures
#[derive(Clone)]
pub struct PgCodePropagator {
    pool: PgPool,
    source_db: String,
}

impl PgCodePropagator {
    /// `source_db` is the reporting database the new codes are diffed from
    pub fn new(pool: PgPool, source_db: impl Into<String>) -> Self {
        Self {
            pool,
            source_db: source_db.into(),
        }
    }
}

#[async_trait]
impl CodePropagator for PgCodePropagator {
    #[instrument(skip(self), fields(source_db = %self.source_db))]
    async fn diff_new_codes(
        &self,
        target_db: &str,
        reportable: Reportable,
    ) -> Result<Vec<NewCode>, DbError> {
        let codes = sqlx::query_as::<_, NewCode>(
            "SELECT code, description FROM sp_sys_get_new_nocs($1, $2, $3)",
        )
        .bind(target_db)
        .bind(reportable.as_str())
        .bind(self.source_db.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::statement("sp_sys_get_new_nocs", target_db))?;

        debug!("{} new codes for {}", codes.len(), target_db);
        Ok(codes)
    }

    async fn apply_code(&self, code: i32, description: &str, code_type: &str) -> Result<(), DbError> {
        sqlx::query("CALL sp_sys_insert_code_value($1, $2, $3)")
            .bind(code)
            .bind(description)
            .bind(code_type)
            .execute(&self.pool)
            .await
            .map_err(DbError::statement(
                "sp_sys_insert_code_value",
                format!("{code_type} {code}"),
            ))?;
        Ok(())
    }
}
