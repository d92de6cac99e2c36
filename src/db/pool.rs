use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

use crate::db::DbError;

/// Open the reporting database. One connection is enough for a sequential run.
#[instrument(skip(database_url))]
pub async fn connect(database_url: &str) -> Result<PgPool, DbError> {
    info!("Connecting to NOC Reporting database");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;
    info!("Database connection established");
    Ok(pool)
}
