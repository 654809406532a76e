//! # MemoryQueue
//!
//! A `Queue` kept in process memory, with the same visibility and receipt semantics as
//! `PgQueue`. Nothing survives a restart: use it for tests and local runs only.
use std::collections::HashMap;
use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::queue::{
    DeadLetterReason, NewMessage, Queue, QueueError, QueueMessage, QueueResult, Receipt,
};

struct StoredMessage {
    message: QueueMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    next_id: i64,
    messages: Vec<StoredMessage>,
    dead_letters: Vec<(QueueMessage, DeadLetterReason)>,
}

impl State {
    fn find(&mut self, receipt: Receipt) -> QueueResult<usize> {
        self.messages
            .iter()
            .position(|stored| stored.message.receipt() == receipt)
            .ok_or(QueueError::ReceiptExpired(receipt))
    }
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    capacity: Option<usize>,
    state: Arc<Mutex<State>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that refuses to hold more than `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Messages currently stored, visible or not, in enqueue order.
    pub async fn messages(&self) -> Vec<QueueMessage> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .map(|stored| stored.message.clone())
            .collect()
    }

    pub async fn dead_letters(&self) -> Vec<(QueueMessage, DeadLetterReason)> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, message: NewMessage) -> QueueResult<()> {
        let mut state = self.state.lock().await;

        if let Some(capacity) = self.capacity {
            if state.messages.len() >= capacity {
                return Err(QueueError::QueueFull { capacity });
            }
        }

        state.next_id += 1;
        let stored = StoredMessage {
            message: QueueMessage {
                id: state.next_id,
                body: message.body,
                attributes: message.attributes,
                receive_count: 0,
                created_at: chrono::Utc::now(),
            },
            visible_at: Instant::now(),
        };
        state.messages.push(stored);

        Ok(())
    }

    async fn receive(
        &self,
        max_messages: u32,
        visibility_timeout: time::Duration,
    ) -> QueueResult<Vec<QueueMessage>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let received = state
            .messages
            .iter_mut()
            .filter(|stored| stored.visible_at <= now)
            .take(max_messages as usize)
            .map(|stored| {
                stored.visible_at = now + visibility_timeout;
                stored.message.receive_count += 1;
                stored.message.clone()
            })
            .collect();

        Ok(received)
    }

    async fn ack(&self, receipt: Receipt) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let position = state.find(receipt)?;
        state.messages.remove(position);

        Ok(())
    }

    async fn release(&self, receipt: Receipt, delay: time::Duration) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let position = state.find(receipt)?;
        state.messages[position].visible_at = Instant::now() + delay;

        Ok(())
    }

    async fn dead_letter(&self, receipt: Receipt, reason: DeadLetterReason) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let position = state.find(receipt)?;
        let stored = state.messages.remove(position);
        state.dead_letters.push((stored.message, reason));

        Ok(())
    }
}
