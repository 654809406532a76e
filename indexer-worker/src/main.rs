//! Consume talk events from the queue and keep the search index up to date.
use std::future::ready;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;

use indexer_common::health::HealthRegistry;
use indexer_common::metrics::{serve, setup_metrics_recorder, setup_metrics_routes};
use indexer_common::pgqueue::PgQueue;
use indexer_common::retry::RetryPolicy;
use indexer_worker::config::Config;
use indexer_worker::dispatcher::EventDispatcher;
use indexer_worker::error::WorkerError;
use indexer_worker::index::IndexWriter;
use indexer_worker::projector::TalkProjector;
use indexer_worker::worker::IndexerWorker;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let liveness = HealthRegistry::new("liveness");
    // A poll can take up to a visibility timeout before the batch is settled.
    let liveness_deadline = config.visibility_timeout.0 * 2 + config.poll_interval.0;
    let worker_liveness = liveness.register(
        "worker".to_string(),
        time::Duration::try_from(liveness_deadline).expect("invalid liveness deadline"),
    );

    let retry_policy = RetryPolicy::build(
        config.retry_policy.backoff_coefficient,
        config.retry_policy.initial_interval.0,
    )
    .maximum_interval(config.retry_policy.maximum_interval.0)
    .provide();

    let queue = PgQueue::new(
        config.queue_name.as_str(),
        &config.database_url,
        config.max_pg_connections,
        "indexer-worker",
    )
    .await
    .expect("failed to initialize queue");

    let projector = TalkProjector::new(config.source.clone(), config.request_timeout.0)?;
    let writer = IndexWriter::new(config.index.clone(), config.request_timeout.0)?;
    let dispatcher = EventDispatcher::new(projector, writer, config.max_concurrent_messages);

    let worker = IndexerWorker::new(
        &config.worker_name,
        Arc::new(queue),
        dispatcher,
        config.max_messages_per_poll,
        config.visibility_timeout.0,
        config.poll_interval.0,
        config.max_receive_count,
        retry_policy,
        worker_liveness,
    );

    let recorder_handle = setup_metrics_recorder().expect("failed to install metrics recorder");
    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let router = setup_metrics_routes(router, recorder_handle);

    let bind = config.bind();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    worker.run().await;

    Ok(())
}

pub async fn index() -> &'static str {
    "talk indexer worker"
}
