//! Runs one lead batch and writes the ranked leads as JSON.
//!
//! Usage: `generate_leads <places|registry> [--out PATH]`

use anyhow::Context;
use dotenvy::dotenv;
use rust_lead_finder::config::Config;
use rust_lead_finder::db::connect_lead_store;
use rust_lead_finder::integrations::services::LeadSources;
use rust_lead_finder::models::LeadSource;
use rust_lead_finder::pipeline::LeadPipeline;
use std::path::PathBuf;
use tokio::sync::watch;

fn parse_args() -> anyhow::Result<(LeadSource, Option<PathBuf>)> {
    let mut args = std::env::args().skip(1);
    let source = args
        .next()
        .context("usage: generate_leads <places|registry> [--out PATH]")?
        .parse::<LeadSource>()
        .map_err(|e| anyhow::anyhow!(e))?;

    let mut out = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out = Some(PathBuf::from(args.next().context("--out needs a path")?)),
            other => anyhow::bail!("Unknown argument '{}'", other),
        }
    }
    Ok((source, out))
}

fn default_output(source: LeadSource) -> PathBuf {
    match source {
        LeadSource::PlacesApi => PathBuf::from("public/leads.json"),
        LeadSource::Registry => PathBuf::from("public/leads-brreg.json"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (source, out) = parse_args()?;
    let out = out.unwrap_or_else(|| default_output(source));
    let config = Config::from_env()?;

    let store = connect_lead_store(&config).await?;

    let pipeline = LeadPipeline::from_config(&config, store)?;
    pipeline.ensure_store()?;

    let sources = LeadSources::from_config(&config)?;
    let today = chrono::Local::now().date_naive();
    let records = sources.get(source)?.fetch_records(today).await?;
    tracing::info!("Sourced {} {} records", records.len(), source.as_str());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing current identity and keeping partial results");
            cancel_tx.send_replace(true);
        }
    });

    let report = pipeline.run(records, cancel_rx).await?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(&report.leads)?;
    tokio::fs::write(&out, json)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    tracing::info!(
        "✓ Wrote {} leads to {} ({} emails found, {} stored{})",
        report.leads.len(),
        out.display(),
        report.stats.emails_found,
        report.stats.persisted,
        if report.stats.interrupted {
            ", interrupted"
        } else {
            ""
        }
    );
    Ok(())
}
