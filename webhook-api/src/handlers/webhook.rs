use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use indexer_common::config::NonEmptyString;
use indexer_common::event::{EVENT_ID_ATTRIBUTE, EVENT_TYPE_ATTRIBUTE};
use indexer_common::queue::{NewMessage, Queue, QueueError};
use indexer_common::signature;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const EVENT_TYPE_HEADER: &str = "x-event-type";
pub const EVENT_ID_HEADER: &str = "x-event-id";

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn Queue>,
    pub secret: NonEmptyString,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct QueuedResponse {
    status: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Error, Debug)]
pub enum IngressError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error(transparent)]
    Enqueue(#[from] QueueError),
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match self {
            IngressError::InvalidSignature => StatusCode::UNAUTHORIZED,
            IngressError::Enqueue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Header value as a string, or empty if missing or not valid UTF-8.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Verify a talk event notification and store it in the queue, exactly as it was received.
pub async fn post_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QueuedResponse>, IngressError> {
    let signature = header(&headers, SIGNATURE_HEADER);
    let event_type = header(&headers, EVENT_TYPE_HEADER);
    let event_id = header(&headers, EVENT_ID_HEADER);

    if !signature::verify(&body, signature, state.secret.as_str()) {
        warn!("rejected event {:?}: invalid signature", event_id);
        metrics::counter!("webhook_api_rejected").increment(1);
        return Err(IngressError::InvalidSignature);
    }

    let message = NewMessage::new(body.to_vec())
        .attribute(EVENT_TYPE_ATTRIBUTE, event_type)
        .attribute(EVENT_ID_ATTRIBUTE, event_id);

    let start_time = Instant::now();

    state.queue.enqueue(message).await.map_err(|error| {
        error!("failed to enqueue event {:?}: {}", event_id, error);
        IngressError::from(error)
    })?;

    let elapsed_time = start_time.elapsed().as_secs_f64();
    metrics::histogram!("webhook_api_enqueue").record(elapsed_time);

    info!("queued event {:?} of type {:?}", event_id, event_type);

    Ok(Json(QueuedResponse {
        status: "queued".to_owned(),
    }))
}
