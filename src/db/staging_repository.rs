use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{DbError, StagedCode};
use crate::loader::StagingStore;
use crate::record::NocRecord;

/// The reporting database table that is wiped and refilled every run
#[derive(Clone)]
pub struct PgStagingTable {
    pool: PgPool,
    table: String,
}

impl PgStagingTable {
    /// `table` must already be a validated identifier; it is spliced into the SQL text
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Current contents ordered by id
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn find_all(&self) -> Result<Vec<StagedCode>, DbError> {
        let sql = format!(
            "SELECT id, code, description, reportable::TEXT AS reportable, degree FROM {} ORDER BY id",
            self.table
        );
        let rows = sqlx::query_as::<_, StagedCode>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::statement("SELECT", &self.table))?;
        debug!("Found {} staged codes", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl StagingStore for PgStagingTable {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn clear(&self) -> Result<u64, DbError> {
        let sql = format!("DELETE FROM {}", self.table);
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(DbError::statement("DELETE", &self.table))?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, id: i32, record: &NocRecord) -> Result<(), DbError> {
        let sql = format!(
            "INSERT INTO {} (id, code, description, reportable, degree) VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(record.code())
            .bind(record.description())
            .bind(record.reportable().as_str())
            .bind(record.degree())
            .execute(&self.pool)
            .await
            .map_err(DbError::statement(
                "INSERT",
                format!("{} (id {}, code {})", self.table, id, record.code()),
            ))?;
        Ok(())
    }
}
