use moka::future::Cache;
use rust_lead_finder::api;
use rust_lead_finder::api::handlers::AppState;
use rust_lead_finder::config::Config;
use rust_lead_finder::core::pipeline::LeadPipeline;
use rust_lead_finder::db::connect_lead_store;
use rust_lead_finder::integrations::services::LeadSources;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the lead finder API.
///
/// Initializes tracing, configuration, the optional lead store, the pipeline
/// and the HTTP routes, then serves until interrupted.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_lead_finder=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store = connect_lead_store(&config).await?;

    let pipeline = Arc::new(LeadPipeline::from_config(&config, store.clone())?);
    let sources = Arc::new(LeadSources::from_config(&config)?);

    // One running batch per source; entries expire if a batch task dies
    let running_batches = Cache::builder()
        .time_to_live(Duration::from_secs(3600))
        .max_capacity(16)
        .build();

    let (shutdown, _) = watch::channel(false);

    let app_state = Arc::new(AppState {
        store,
        pipeline,
        sources,
        running_batches,
        shutdown: shutdown.clone(),
        batches: TaskTracker::new(),
    });
    let batches = app_state.batches.clone();

    let app = api::router(app_state)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown requested; stopping running batches");
        shutdown.send_replace(true);
    })
    .await?;

    // Running batches stop between identities, then rank and persist what they have
    batches.close();
    if !batches.is_empty() {
        tracing::info!("Waiting for {} running batch(es) to persist", batches.len());
    }
    batches.wait().await;
    tracing::info!("✓ Shutdown complete");

    Ok(())
}
