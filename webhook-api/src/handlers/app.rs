use axum::{extract::DefaultBodyLimit, handler::Handler, routing, Router};
use tower::limit::ConcurrencyLimitLayer;

use indexer_common::metrics::track_metrics;

use super::webhook::{self, AppState};

/// Health checks live on `/health`; every other path, whatever the method, is the webhook.
pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    router
        .route("/health", routing::get(health).post(health))
        .fallback_service(webhook::post_webhook.with_state(state))
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(axum::middleware::from_fn(track_metrics))
}

pub async fn health() -> &'static str {
    "OK"
}
