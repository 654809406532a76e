//! # Queue
//!
//! The contract of the durable queue sitting between the webhook API and the indexer worker.
//! Delivery is at-least-once: a received message is only hidden for a visibility timeout, and
//! is delivered again unless the consumer acknowledges it before that.
use std::collections::HashMap;
use std::time;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumeration of errors for operations on a `Queue`.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("pool creation failed with: {error}")]
    PoolCreationError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },
    #[error("receipt for delivery {} of message {} has expired", .0.receive_count, .0.message_id)]
    ReceiptExpired(Receipt),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Identifies one delivery of a message.
/// Once a message is received again, receipts from earlier deliveries no longer match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Receipt {
    pub message_id: i64,
    pub receive_count: i32,
}

/// A message to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub body: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl NewMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_owned(), value.to_owned());
        self
    }
}

/// A message handed out by `Queue::receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: i64,
    pub body: Vec<u8>,
    pub attributes: HashMap<String, String>,
    /// How many times this message has been received, including this delivery.
    pub receive_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl QueueMessage {
    pub fn receipt(&self) -> Receipt {
        Receipt {
            message_id: self.id,
            receive_count: self.receive_count,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Why a message was parked instead of being redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterReason {
    pub kind: String,
    pub message: String,
}

#[async_trait]
pub trait Queue: Send + Sync {
    /// Durably store a message. Once this returns `Ok` the message will be delivered at least once.
    async fn enqueue(&self, message: NewMessage) -> QueueResult<()>;

    /// Receive up to `max_messages` visible messages, hiding them for `visibility_timeout`.
    async fn receive(
        &self,
        max_messages: u32,
        visibility_timeout: time::Duration,
    ) -> QueueResult<Vec<QueueMessage>>;

    /// Delete a message after it was successfully processed.
    async fn ack(&self, receipt: Receipt) -> QueueResult<()>;

    /// Make a message visible again after `delay`, to be retried.
    async fn release(&self, receipt: Receipt, delay: time::Duration) -> QueueResult<()>;

    /// Park a message that exhausted its deliveries. It will not be received again.
    async fn dead_letter(&self, receipt: Receipt, reason: DeadLetterReason) -> QueueResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_attributes() {
        let message = NewMessage::new(r#"{"a":1}"#)
            .attribute("eventType", "talk.updated")
            .attribute("eventId", "e1");

        assert_eq!(message.body, br#"{"a":1}"#.to_vec());
        assert_eq!(message.attributes.len(), 2);
        assert_eq!(message.attributes["eventType"], "talk.updated");
    }

    #[test]
    fn test_receipt_expired_message() {
        let error = QueueError::ReceiptExpired(Receipt {
            message_id: 7,
            receive_count: 2,
        });

        assert_eq!(
            error.to_string(),
            "receipt for delivery 2 of message 7 has expired"
        );
    }
}
