use crate::errors::AppError;
use crate::models::{Lead, LeadSource, LeadStatus};
use crate::pipeline::LeadPipeline;
use crate::providers::LeadStore;
use crate::services::LeadSources;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lead store; `None` when no database is configured.
    pub store: Option<Arc<dyn LeadStore>>,
    pub pipeline: Arc<LeadPipeline>,
    pub sources: Arc<LeadSources>,
    /// Source → start timestamp of the batch currently running for it.
    pub running_batches: Cache<String, i64>,
    /// Flipped to `true` on shutdown; running batches stop between identities.
    pub shutdown: watch::Sender<bool>,
    /// Background batch tasks; awaited on shutdown so partial results persist.
    pub batches: TaskTracker,
}

impl AppState {
    fn store(&self) -> Result<&Arc<dyn LeadStore>, AppError> {
        self.store.as_ref().ok_or_else(|| {
            AppError::ConfigurationMissing("Lead store not configured".to_string())
        })
    }
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-lead-finder",
            "version": env!("CARGO_PKG_VERSION"),
            "store_configured": state.store.is_some(),
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ListLeadsParams {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

/// GET /api/v1/leads
///
/// Stored leads, best first, optionally filtered by review status.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListLeadsParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    let status = params
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let leads = state.store()?.list(status, limit).await?;
    tracing::debug!("GET /leads - {} leads (status {:?})", leads.len(), status);
    Ok(Json(leads))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub source: String,
}

/// POST /api/v1/leads/generate
///
/// Starts a background batch for one source. A second request for the same
/// source while a batch is running is answered as a duplicate.
pub async fn generate_leads(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let source: LeadSource = request.source.parse().map_err(AppError::BadRequest)?;
    state.pipeline.ensure_store()?;
    let record_source = state
        .sources
        .get(source)
        .map_err(|e| AppError::ConfigurationMissing(e.to_string()))?;

    let key = source.as_str().to_string();
    let now = chrono::Utc::now().timestamp();
    let entry = state.running_batches.entry(key.clone()).or_insert(now).await;
    if !entry.is_fresh() {
        let seconds_ago = now - entry.into_value();
        tracing::warn!(
            "⏭ DUPLICATE REQUEST BLOCKED - {} batch already running ({} seconds ago)",
            key,
            seconds_ago
        );
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "message": format!("A {} batch is already running (started {} seconds ago)", key, seconds_ago),
                "source": key,
                "duplicate_request": true
            })),
        ));
    }

    let run_id = Uuid::new_v4();
    tracing::info!("=== Lead batch {} started for {} ===", run_id, key);

    let task_state = state.clone();
    state.batches.spawn(async move {
        let today = chrono::Local::now().date_naive();
        let mut cancel = task_state.shutdown.subscribe();
        let sourced = tokio::select! {
            records = record_source.fetch_records(today) => Some(records),
            _ = cancel.wait_for(|stop| *stop) => None,
        };
        match sourced {
            None => tracing::warn!("Lead batch {} stopped while sourcing records", run_id),
            Some(Ok(records)) => {
                match task_state.pipeline.run(records, cancel).await {
                    Ok(report) => tracing::info!(
                        "✓ Lead batch {} finished: {} leads, stats {:?}",
                        run_id,
                        report.leads.len(),
                        report.stats
                    ),
                    Err(e) => tracing::error!("Lead batch {} failed: {}", run_id, e),
                }
            }
            Some(Err(e)) => {
                tracing::error!("Lead batch {} could not source records: {}", run_id, e)
            }
        }
        task_state.running_batches.invalidate(&key).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "run_id": run_id,
            "source": source.as_str(),
            "duplicate_request": false
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

/// PATCH /api/v1/leads/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status: LeadStatus = request.status.parse().map_err(AppError::BadRequest)?;
    if id.trim().is_empty() {
        return Err(AppError::BadRequest("Lead id must not be empty".to_string()));
    }

    state
        .store()?
        .set_status(&id, status, request.notes.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "id": id,
        "status": status.as_str()
    })))
}
