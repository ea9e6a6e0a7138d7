use crate::errors::{AppError, ResultExt};
use crate::models::{Lead, LeadSource, LeadStatus};
use crate::providers::LeadStore;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id                TEXT PRIMARY KEY,
        name              TEXT NOT NULL,
        address           TEXT NOT NULL DEFAULT '',
        rating            DOUBLE PRECISION NOT NULL DEFAULT 0,
        user_rating_count INTEGER NOT NULL DEFAULT 0,
        industry          TEXT NOT NULL DEFAULT '',
        phone             TEXT NOT NULL DEFAULT '',
        email             TEXT,
        locale            TEXT NOT NULL DEFAULT '',
        has_website       BOOLEAN NOT NULL DEFAULT FALSE,
        potential_score   SMALLINT NOT NULL DEFAULT 0,
        info              TEXT NOT NULL DEFAULT '',
        source            TEXT NOT NULL,
        status            TEXT NOT NULL DEFAULT 'pending',
        notes             TEXT NOT NULL DEFAULT '',
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS leads_status_idx ON leads (status)",
    "CREATE INDEX IF NOT EXISTS leads_score_idx ON leads (potential_score DESC)",
];

/// Pipeline-owned columns are refreshed on conflict; `status` and `notes`
/// belong to reviewers and are only written for new rows. Rows in a terminal
/// status are left untouched.
const UPSERT_LEAD: &str = r#"
    INSERT INTO leads (
        id, name, address, rating, user_rating_count, industry, phone, email,
        locale, has_website, potential_score, info, source, status, notes
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14)
    ON CONFLICT (id) DO UPDATE SET
        name = EXCLUDED.name,
        address = EXCLUDED.address,
        rating = EXCLUDED.rating,
        user_rating_count = EXCLUDED.user_rating_count,
        industry = EXCLUDED.industry,
        phone = EXCLUDED.phone,
        email = COALESCE(EXCLUDED.email, leads.email),
        locale = EXCLUDED.locale,
        has_website = EXCLUDED.has_website,
        potential_score = EXCLUDED.potential_score,
        info = EXCLUDED.info,
        source = EXCLUDED.source,
        updated_at = NOW()
    WHERE leads.status NOT IN ('accepted', 'rejected')
"#;

#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: String,
    name: String,
    address: String,
    rating: f64,
    user_rating_count: i32,
    industry: String,
    phone: String,
    email: Option<String>,
    locale: String,
    has_website: bool,
    potential_score: i16,
    info: String,
    source: String,
    status: String,
    notes: String,
}

impl LeadRow {
    fn into_lead(self) -> Lead {
        let source = self.source.parse().unwrap_or_else(|_| {
            tracing::warn!("Lead {} has unknown source '{}'", self.id, self.source);
            LeadSource::PlacesApi
        });
        Lead {
            status: LeadStatus::parse_or_pending(Some(&self.status)),
            potential_score: self.potential_score.clamp(0, 100) as u8,
            user_rating_count: self.user_rating_count.max(0) as u32,
            source,
            id: self.id,
            name: self.name,
            address: self.address,
            rating: self.rating,
            industry: self.industry,
            phone: self.phone,
            email: self.email,
            locale: self.locale,
            has_website: self.has_website,
            info: self.info,
            notes: self.notes,
        }
    }
}

/// Postgres-backed lead store.
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn existing_ids(&self) -> Result<HashSet<String>, AppError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM leads")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read existing lead ids")?;

        tracing::debug!("Loaded {} existing lead ids", ids.len());
        Ok(ids.into_iter().collect())
    }

    async fn upsert(&self, leads: &[Lead]) -> Result<usize, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start lead transaction")?;

        let mut written = 0;
        for lead in leads {
            let result = sqlx::query(UPSERT_LEAD)
                .bind(&lead.id)
                .bind(&lead.name)
                .bind(&lead.address)
                .bind(lead.rating)
                .bind(lead.user_rating_count as i32)
                .bind(&lead.industry)
                .bind(&lead.phone)
                .bind(lead.email.as_deref())
                .bind(&lead.locale)
                .bind(lead.has_website)
                .bind(lead.potential_score as i16)
                .bind(&lead.info)
                .bind(lead.source.as_str())
                .bind(&lead.notes)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to upsert lead {}", lead.id))?;

            if result.rows_affected() == 0 {
                tracing::debug!("Lead {} is in a terminal status, left untouched", lead.id);
            }
            written += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .context("Failed to commit lead transaction")?;

        tracing::info!("✓ Stored {} of {} leads", written, leads.len());
        Ok(written)
    }

    async fn list(&self, status: Option<LeadStatus>, limit: i64) -> Result<Vec<Lead>, AppError> {
        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, name, address, rating, user_rating_count, industry, phone, email,
                   locale, has_website, potential_score, info, source, status, notes
            FROM leads
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY potential_score DESC, user_rating_count DESC, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list leads")?;

        Ok(rows.into_iter().map(LeadRow::into_lead).collect())
    }

    async fn set_status(
        &self,
        id: &str,
        status: LeadStatus,
        notes: Option<&str>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(notes)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update status of lead {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", id)));
        }

        tracing::info!("✓ Lead {} marked {}", id, status.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_never_writes_review_fields_on_conflict() {
        let (_, on_conflict) = UPSERT_LEAD.split_once("DO UPDATE SET").unwrap();
        assert!(!on_conflict.contains("status ="));
        assert!(!on_conflict.contains("notes ="));
        assert!(on_conflict.contains("WHERE leads.status NOT IN ('accepted', 'rejected')"));
    }

    #[test]
    fn test_row_conversion_is_lenient() {
        let row = LeadRow {
            id: "926543210".to_string(),
            name: "Asker Rør AS".to_string(),
            address: String::new(),
            rating: 0.0,
            user_rating_count: -1,
            industry: "VVS-arbeid".to_string(),
            phone: "+4741234567".to_string(),
            email: None,
            locale: "ASKER".to_string(),
            has_website: false,
            potential_score: 140,
            info: String::new(),
            source: "brreg".to_string(),
            status: "archived".to_string(),
            notes: String::new(),
        };
        let lead = row.into_lead();
        assert_eq!(lead.source, LeadSource::Registry);
        assert_eq!(lead.status, LeadStatus::Pending);
        assert_eq!(lead.potential_score, 100);
        assert_eq!(lead.user_rating_count, 0);
    }
}
