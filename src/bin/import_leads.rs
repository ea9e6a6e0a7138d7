//! Imports previously generated lead files into the lead store.
//!
//! Only new ids are inserted; leads already in the store (whatever their
//! review status) are skipped.
//!
//! Usage: `import_leads FILE...`

use anyhow::Context;
use dotenvy::dotenv;
use rust_lead_finder::db::Database;
use rust_lead_finder::integrations::storage::PgLeadStore;
use rust_lead_finder::models::{BlacklistSet, Lead, LeadStatus};
use rust_lead_finder::pipeline::filter_new;
use rust_lead_finder::providers::LeadStore;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let files: Vec<String> = env::args().skip(1).collect();
    if files.is_empty() {
        anyhow::bail!("usage: import_leads FILE...");
    }

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::new(&database_url).await?;
    db.ensure_schema().await?;
    let store = PgLeadStore::new(db.pool);

    let mut known = BlacklistSet::from(store.existing_ids().await?);
    tracing::info!("{} leads already in the store", known.len());

    let mut imported = 0;
    for file in &files {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file))?;
        let leads: Vec<Lead> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of leads", file))?;
        let total = leads.len();

        let (mut fresh, skipped) = filter_new(leads, &mut known);
        for lead in &mut fresh {
            lead.status = LeadStatus::Pending;
        }

        if fresh.is_empty() {
            tracing::info!("{}: {} leads, nothing new", file, total);
            continue;
        }

        let written = store.upsert(&fresh).await?;
        imported += written;
        tracing::info!(
            "✓ {}: imported {} of {} leads ({} already known)",
            file,
            written,
            total,
            skipped
        );
    }

    tracing::info!("Import complete: {} new leads, {} known in total", imported, known.len());
    Ok(())
}
