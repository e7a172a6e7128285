//! PostgreSQL-backed domain index.

use crate::core::{DomainRecord, DomainStore};
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

/// Insert-or-merge of one observation.
///
/// `SET` expressions see the pre-update row, so `last_seen` is computed from
/// the old `first_seen`. `etld` is only written on insert.
const UPSERT_DOMAIN: &str = r#"
    INSERT INTO domains (domain, first_seen, last_seen, etld)
    VALUES ($1, $2, $2, $3)
    ON CONFLICT (domain) DO UPDATE SET
        last_seen = GREATEST($2, domains.first_seen),
        first_seen = LEAST(domains.first_seen, $2)
"#;

const SELECT_DOMAIN: &str = r#"
    SELECT domain, COALESCE(etld, '') AS etld, first_seen, last_seen
    FROM domains
    WHERE domain = $1
"#;

pub struct PgDomainStore {
    pool: PgPool,
}

impl PgDomainStore {
    /// Opens a connection pool. Fails if the database is unreachable.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await?;
        info!(max_connections, "Database connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn upsert(&self, domain: &str, etld: &str, seen: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(UPSERT_DOMAIN)
            .bind(domain)
            .bind(seen)
            .bind(etld)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, domain: &str) -> Result<Option<DomainRecord>, StoreError> {
        sqlx::query_as::<_, DomainRecord>(SELECT_DOMAIN)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }
}
