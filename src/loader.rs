use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{self, DbError, NewCode, PgCodePropagator, PgStagingTable};
use crate::record::{NocRecord, Reportable};

/// The staging table in the reporting database
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Remove every row. Returns the number deleted.
    async fn clear(&self) -> Result<u64, DbError>;

    async fn insert(&self, id: i32, record: &NocRecord) -> Result<(), DbError>;
}

/// Stored-procedure contract for pushing new codes into downstream databases
#[async_trait]
pub trait CodePropagator: Send + Sync {
    /// Codes in the staging table that `target_db` does not have yet
    async fn diff_new_codes(
        &self,
        target_db: &str,
        reportable: Reportable,
    ) -> Result<Vec<NewCode>, DbError>;

    async fn apply_code(&self, code: i32, description: &str, code_type: &str) -> Result<(), DbError>;
}

/// Anything that can take a parsed code list and persist it
#[async_trait]
pub trait Load: Send + Sync {
    async fn load(&self, records: &[NocRecord]) -> Result<LoadSummary, LoadError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to connect to reporting database: {0}")]
    Connect(#[source] DbError),

    #[error("Failed to clear staging table: {0}")]
    Clear(#[source] DbError),

    #[error("Propagation of {code_type} codes to {database} failed: {source}")]
    Propagation {
        database: String,
        code_type: String,
        #[source]
        source: DbError,
    },
}

/// One downstream database and the kind of code pushed into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationTarget {
    pub database: String,
    pub reportable: Reportable,
    pub code_type: String,
}

impl PropagationTarget {
    pub fn new(database: impl Into<String>, reportable: Reportable, code_type: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            reportable,
            code_type: code_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationResult {
    pub database: String,
    pub code_type: String,
    pub applied: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Rows removed from the staging table before inserting
    pub cleared: u64,
    pub attempted: usize,
    pub inserted: usize,
    /// Sequential ids whose insert failed and was skipped
    pub failed_ids: Vec<i32>,
    pub propagated: Vec<PropagationResult>,
}

/// Replaces the staging table contents, then propagates to each downstream target in order
pub struct NocLoader<S, P> {
    staging: S,
    propagator: P,
    targets: Vec<PropagationTarget>,
}

impl<S, P> NocLoader<S, P>
where
    S: StagingStore,
    P: CodePropagator,
{
    pub fn new(staging: S, propagator: P, targets: Vec<PropagationTarget>) -> Self {
        Self {
            staging,
            propagator,
            targets,
        }
    }

    pub fn staging(&self) -> &S {
        &self.staging
    }

    pub fn propagator(&self) -> &P {
        &self.propagator
    }

    /// Clear the staging table and insert every record with ids 1..=n.
    ///
    /// A record that fails to insert is logged and skipped; its id is not reused.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn replace_staging(&self, records: &[NocRecord]) -> Result<LoadSummary, LoadError> {
        let cleared = self.staging.clear().await.map_err(LoadError::Clear)?;
        info!("Previous Reporting database table entries cleared ({} rows)", cleared);

        let mut summary = LoadSummary {
            cleared,
            ..LoadSummary::default()
        };

        info!("About to add {} entries to NOC Reporting database", records.len());

        for (idx, record) in records.iter().enumerate() {
            let id = idx as i32 + 1;
            summary.attempted += 1;

            match self.staging.insert(id, record).await {
                Ok(()) => summary.inserted += 1,
                Err(e) => {
                    error!("Failed to insert row {} ({}): {}", id, record, e);
                    summary.failed_ids.push(id);
                }
            }
        }

        if !summary.failed_ids.is_empty() {
            warn!(
                "{} of {} rows failed to insert: {:?}",
                summary.failed_ids.len(),
                summary.attempted,
                summary.failed_ids
            );
        }
        info!("Added {} entries to Reporting database", summary.inserted);

        Ok(summary)
    }

    /// Push new codes into one downstream database
    #[instrument(skip(self), fields(database = %target.database, code_type = %target.code_type))]
    pub async fn propagate_target(
        &self,
        target: &PropagationTarget,
    ) -> Result<PropagationResult, LoadError> {
        let wrap = |source: DbError| LoadError::Propagation {
            database: target.database.clone(),
            code_type: target.code_type.clone(),
            source,
        };

        let new_codes = self
            .propagator
            .diff_new_codes(&target.database, target.reportable)
            .await
            .map_err(wrap)?;

        info!(
            "About to add {} new NOC entries from Reporting database to {} database",
            new_codes.len(),
            target.database
        );

        for new_code in &new_codes {
            debug!("Applying {} {} to {}", target.code_type, new_code.code, target.database);
            self.propagator
                .apply_code(new_code.code, &new_code.description, &target.code_type)
                .await
                .map_err(wrap)?;
        }

        info!(
            "Added {} new NOC entries to {} database",
            new_codes.len(),
            target.database
        );

        Ok(PropagationResult {
            database: target.database.clone(),
            code_type: target.code_type.clone(),
            applied: new_codes.len(),
        })
    }
}

#[async_trait]
impl<S, P> Load for NocLoader<S, P>
where
    S: StagingStore,
    P: CodePropagator,
{
    async fn load(&self, records: &[NocRecord]) -> Result<LoadSummary, LoadError> {
        let mut summary = self.replace_staging(records).await?;

        if self.targets.is_empty() {
            info!("No downstream databases configured, skipping propagation");
        }

        for target in &self.targets {
            let result = self.propagate_target(target).await?;
            summary.propagated.push(result);
        }

        Ok(summary)
    }
}

/// Connects to PostgreSQL for the duration of one load
pub struct PostgresLoader {
    database_url: String,
    staging_table: String,
    source_db: String,
    targets: Vec<PropagationTarget>,
}

impl PostgresLoader {
    pub fn new(
        database_url: impl Into<String>,
        staging_table: impl Into<String>,
        source_db: impl Into<String>,
        targets: Vec<PropagationTarget>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            staging_table: staging_table.into(),
            source_db: source_db.into(),
            targets,
        }
    }
}

#[async_trait]
impl Load for PostgresLoader {
    async fn load(&self, records: &[NocRecord]) -> Result<LoadSummary, LoadError> {
        let pool = db::connect(&self.database_url)
            .await
            .map_err(LoadError::Connect)?;

        let loader = NocLoader::new(
            PgStagingTable::new(pool.clone(), self.staging_table.clone()),
            PgCodePropagator::new(pool.clone(), self.source_db.clone()),
            self.targets.clone(),
        );

        let result = loader.load(records).await;
        pool.close().await;
        result
    }
}
