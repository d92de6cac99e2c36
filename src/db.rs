pub mod error;
pub mod models;
pub mod pool;
pub mod propagation_repository;
pub mod staging_repository;

pub use error::DbError;
pub use models::*;
pub use pool::connect;
pub use propagation_repository::PgCodePropagator;
pub use staging_repository::PgStagingTable;
