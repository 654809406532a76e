//! Accept signed talk event notifications and store them in the queue for the indexer worker.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;

use config::Config;
use handlers::AppState;
use indexer_common::metrics::{serve, setup_metrics_recorder, setup_metrics_routes};
use indexer_common::pgqueue::PgQueue;

mod config;
mod handlers;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let pg_queue = PgQueue::new(
        config.queue_name.as_str(),
        &config.database_url,
        config.max_pg_connections,
        "webhook-api",
    )
    .await
    .expect("failed to initialize queue");

    let state = AppState {
        queue: Arc::new(pg_queue),
        secret: config.webhook_secret.clone(),
    };
    let app = handlers::add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );

    let recorder_handle = setup_metrics_recorder().expect("failed to install metrics recorder");
    let metrics_bind = config.metrics_bind();
    tokio::task::spawn(async move {
        let router = setup_metrics_routes(Router::new(), recorder_handle);
        if let Err(e) = serve(router, &metrics_bind).await {
            tracing::error!("failed to start serving metrics, {}", e);
        }
    });

    match serve(app, &config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start webhook-api http server, {}", e),
    }
}
