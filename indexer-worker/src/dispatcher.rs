//! Routes talk events to the projector and the index writer.
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use indexer_common::event::{EventKind, WebhookEvent};
use indexer_common::queue::QueueMessage;

use crate::document::UNPUBLISHED_STATUS;
use crate::error::{EventError, IndexError};
use crate::index::IndexWriter;
use crate::projector::TalkProjector;

/// What handling an event did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The talk was projected and its document written in full.
    Indexed,
    /// Only the status of the document was changed.
    StatusPatched,
    /// The talk was unpublished before it was ever indexed.
    MissingDocument,
    /// Nothing to do for this kind of event.
    Ignored,
}

/// A message that could not be handled, and why.
#[derive(Debug)]
pub struct FailedMessage {
    pub message: QueueMessage,
    pub error: EventError,
}

/// The result of dispatching one batch.
/// Every message of the batch ends up in exactly one of the two lists.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Messages that are done with, including malformed ones that will never succeed.
    pub acknowledged: Vec<QueueMessage>,
    /// Messages that should be delivered again.
    pub failed: Vec<FailedMessage>,
}

#[derive(Clone)]
pub struct EventDispatcher {
    projector: TalkProjector,
    writer: IndexWriter,
    max_concurrent_messages: usize,
}

impl EventDispatcher {
    pub fn new(
        projector: TalkProjector,
        writer: IndexWriter,
        max_concurrent_messages: usize,
    ) -> Self {
        Self {
            projector,
            writer,
            max_concurrent_messages: max_concurrent_messages.max(1),
        }
    }

    /// Apply a single event to the index.
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<EventOutcome, EventError> {
        let talk_id = event.entity_id.as_str();

        match &event.event_type {
            EventKind::TalkCreated | EventKind::TalkUpdated | EventKind::TalkPublished => {
                let document = self.projector.project(talk_id).await?;
                self.writer.upsert(talk_id, &document).await?;

                info!("indexed talk {} after {}", talk_id, event.event_type);
                Ok(EventOutcome::Indexed)
            }
            EventKind::TalkUnpublished => {
                match self.writer.patch_status(talk_id, UNPUBLISHED_STATUS).await {
                    Ok(()) => {
                        info!("unpublished talk {}", talk_id);
                        Ok(EventOutcome::StatusPatched)
                    }
                    Err(IndexError::DocumentMissing { .. }) => {
                        warn!("talk {} was unpublished but has no document", talk_id);
                        Ok(EventOutcome::MissingDocument)
                    }
                    Err(error) => Err(error.into()),
                }
            }
            EventKind::Other(kind) => {
                debug!("ignoring event {} of type {}", event.event_id, kind);
                Ok(EventOutcome::Ignored)
            }
        }
    }

    /// Handle every message of a batch, reporting which ones succeeded and which ones failed.
    /// Messages for different talks run concurrently; messages for the same talk run in
    /// the order they were received, and once one of them fails the rest are failed unhandled.
    pub async fn dispatch(&self, messages: Vec<QueueMessage>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut talks: Vec<(String, Vec<(QueueMessage, WebhookEvent)>)> = Vec::new();

        for message in messages {
            let event = match WebhookEvent::parse(&message.body) {
                Ok(event) => event,
                Err(error) => {
                    warn!("dropping malformed message {}: {}", message.id, error);
                    metrics::counter!("talk_events_dropped").increment(1);
                    outcome.acknowledged.push(message);
                    continue;
                }
            };

            match talks.iter_mut().find(|(id, _)| *id == event.entity_id) {
                Some((_, events)) => events.push((message, event)),
                None => talks.push((event.entity_id.clone(), vec![(message, event)])),
            }
        }

        let results: Vec<Vec<(QueueMessage, Result<EventOutcome, EventError>)>> =
            stream::iter(talks)
                .map(|(_, events)| self.handle_talk_events(events))
                .buffer_unordered(self.max_concurrent_messages)
                .collect()
                .await;

        for (message, result) in results.into_iter().flatten() {
            match result {
                Ok(_) => outcome.acknowledged.push(message),
                Err(error) => outcome.failed.push(FailedMessage { message, error }),
            }
        }

        outcome
    }

    async fn handle_talk_events(
        &self,
        events: Vec<(QueueMessage, WebhookEvent)>,
    ) -> Vec<(QueueMessage, Result<EventOutcome, EventError>)> {
        let mut results = Vec::with_capacity(events.len());
        let mut failed = false;

        for (message, event) in events {
            // Applying a later event before an earlier failed one would reorder the talk.
            if failed {
                let error = EventError::Deferred {
                    talk_id: event.entity_id.clone(),
                };
                metrics::counter!("talk_events_failed", "kind" => error.kind()).increment(1);
                results.push((message, Err(error)));
                continue;
            }

            let labels = [("event_type", event_type_label(&event.event_type))];
            metrics::counter!("talk_events_total", &labels).increment(1);

            let now = tokio::time::Instant::now();
            let result = self.handle_event(&event).await;

            match &result {
                Ok(_) => {
                    metrics::histogram!("talk_event_processing_duration_seconds", &labels)
                        .record(now.elapsed().as_secs_f64());
                }
                Err(error) => {
                    failed = true;
                    warn!(
                        "failed to handle event {} for talk {}: {}",
                        event.event_id, event.entity_id, error
                    );
                    metrics::counter!("talk_events_failed", "kind" => error.kind()).increment(1);
                }
            }

            results.push((message, result));
        }

        results
    }
}

fn event_type_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::TalkCreated => "talk.created",
        EventKind::TalkUpdated => "talk.updated",
        EventKind::TalkPublished => "talk.published",
        EventKind::TalkUnpublished => "talk.unpublished",
        EventKind::Other(_) => "other",
    }
}
