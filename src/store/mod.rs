pub mod postgres;

use thiserror::Error;

pub use postgres::PgDomainStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store rejected write: {0}")]
    Rejected(String),
}
