use crate::config::Config;
use crate::db_storage::PgLeadStore;
use crate::providers::LeadStore;
use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the `leads` table and its indexes when missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in crate::db_storage::SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("✓ Lead schema ready");
        Ok(())
    }
}

/// Connects the configured lead store.
///
/// `Ok(None)` when no `DATABASE_URL` is set, or when the store is unreachable
/// and `REQUIRE_STORE` is off; the run then continues without dedup or
/// persistence.
pub async fn connect_lead_store(config: &Config) -> anyhow::Result<Option<Arc<dyn LeadStore>>> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };

    let connected = async {
        let db = Database::new(url).await?;
        db.ensure_schema().await?;
        anyhow::Ok(db)
    }
    .await;

    match connected {
        Ok(db) => {
            tracing::info!("✓ Lead store connected");
            let store: Arc<dyn LeadStore> = Arc::new(PgLeadStore::new(db.pool));
            Ok(Some(store))
        }
        Err(e) if !config.require_store => {
            tracing::warn!("Lead store unreachable, continuing without it: {:#}", e);
            Ok(None)
        }
        Err(e) => Err(e).context("Lead store required but unreachable"),
    }
}
