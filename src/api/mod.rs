//! HTTP surface: handlers and the route table.

pub mod handlers {
    pub use crate::handlers::*;
}

use crate::handlers::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Lead API routes. `/health` is exempt from rate limiting; everything else
/// is limited to 10 requests/second per client IP with a burst of 20.
pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/generate", post(handlers::generate_leads))
        .route("/api/v1/leads/:id/status", patch(handlers::update_status))
        .layer(
            ServiceBuilder::new()
                // 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
