#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// A statement against a known table or procedure failed
    #[error("{operation} failed on {object}: {source}")]
    Statement {
        operation: &'static str,
        object: String,
        #[source]
        source: sqlx::Error,
    },
}

impl DbError {
    pub fn statement(operation: &'static str, object: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let object = object.into();
        move |source| DbError::Statement {
            operation,
            object,
            source,
        }
    }
}
