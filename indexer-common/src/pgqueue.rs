//! # PgQueue
//!
//! A `Queue` implementation backed by a PostgreSQL table.
//!
//! Receiving a message does not lock it: instead its `visible_at` is pushed forward by the
//! visibility timeout and its `receive_count` is incremented. A `Receipt` matches a row only
//! while its `receive_count` is unchanged, so a consumer that took too long cannot delete a
//! message that was already handed to another consumer.
use std::collections::HashMap;
use std::str::FromStr;
use std::time;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::queue::{
    DeadLetterReason, NewMessage, Queue, QueueError, QueueMessage, QueueResult, Receipt,
};

#[derive(sqlx::FromRow, Debug)]
struct MessageRow {
    id: i64,
    body: Vec<u8>,
    attributes: sqlx::types::Json<HashMap<String, String>>,
    receive_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageRow> for QueueMessage {
    fn from(row: MessageRow) -> Self {
        QueueMessage {
            id: row.id,
            body: row.body,
            attributes: row.attributes.0,
            receive_count: row.receive_count,
            created_at: row.created_at,
        }
    }
}

/// A queue implemented on top of a PostgreSQL table.
#[derive(Clone)]
pub struct PgQueue {
    /// A name to identify this PgQueue as multiple may share a table.
    name: String,
    /// A connection pool used to connect to the PostgreSQL database.
    pool: PgPool,
}

impl PgQueue {
    /// Initialize a new PgQueue by creating a lazy connection pool to the database in `url`.
    ///
    /// # Arguments
    ///
    /// * `queue_name`: A name for the queue we are going to initialize.
    /// * `url`: A URL pointing to where the PostgreSQL database is hosted.
    /// * `max_connections`: The size of the connection pool.
    /// * `app_name`: Reported to PostgreSQL as the `application_name` of our connections.
    pub async fn new(
        queue_name: &str,
        url: &str,
        max_connections: u32,
        app_name: &'static str,
    ) -> QueueResult<Self> {
        let name = queue_name.to_owned();
        let options = PgConnectOptions::from_str(url)
            .map_err(|error| QueueError::PoolCreationError { error })?
            .application_name(app_name);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with(options);

        Ok(Self { name, pool })
    }

    /// Initialize a new PgQueue from a provided connection pool.
    pub async fn new_from_pool(queue_name: &str, pool: PgPool) -> PgQueue {
        let name = queue_name.to_owned();

        Self { name, pool }
    }

    /// Run an UPDATE or DELETE against the row matching `receipt`, failing if the receipt is stale.
    async fn update_receipt(
        &self,
        command: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
        receipt: Receipt,
    ) -> QueueResult<()> {
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: command.to_owned(),
                error,
            })?;

        if result.rows_affected() == 0 {
            return Err(QueueError::ReceiptExpired(receipt));
        }

        Ok(())
    }
}

#[async_trait]
impl Queue for PgQueue {
    async fn enqueue(&self, message: NewMessage) -> QueueResult<()> {
        let base_query = r#"
INSERT INTO talk_event_queue
    (queue, body, attributes, status, receive_count, created_at, visible_at)
VALUES
    ($1, $2, $3, 'available'::message_status, 0, NOW(), NOW())
        "#;

        sqlx::query(base_query)
            .bind(&self.name)
            .bind(&message.body)
            .bind(sqlx::types::Json(&message.attributes))
            .execute(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: "INSERT".to_owned(),
                error,
            })?;

        Ok(())
    }

    async fn receive(
        &self,
        max_messages: u32,
        visibility_timeout: time::Duration,
    ) -> QueueResult<Vec<QueueMessage>> {
        // The query that follows uses a FOR UPDATE SKIP LOCKED clause so concurrent consumers
        // never receive the same delivery.
        let base_query = r#"
WITH visible_in_queue AS (
    SELECT
        id
    FROM
        talk_event_queue
    WHERE
        queue = $1
        AND status = 'available'
        AND visible_at <= NOW()
    ORDER BY
        visible_at,
        id
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE
    talk_event_queue
SET
    visible_at = NOW() + $3,
    receive_count = receive_count + 1,
    last_received_at = NOW()
FROM
    visible_in_queue
WHERE
    talk_event_queue.id = visible_in_queue.id
RETURNING
    talk_event_queue.id,
    talk_event_queue.body,
    talk_event_queue.attributes,
    talk_event_queue.receive_count,
    talk_event_queue.created_at
        "#;

        let rows: Vec<MessageRow> = sqlx::query_as(base_query)
            .bind(&self.name)
            .bind(i64::from(max_messages))
            .bind(visibility_timeout)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: "UPDATE".to_owned(),
                error,
            })?;

        let mut messages: Vec<QueueMessage> = rows.into_iter().map(QueueMessage::from).collect();
        // RETURNING gives no ordering guarantees.
        messages.sort_by_key(|message| message.id);

        Ok(messages)
    }

    async fn ack(&self, receipt: Receipt) -> QueueResult<()> {
        let base_query = r#"
DELETE FROM
    talk_event_queue
WHERE
    queue = $1
    AND id = $2
    AND receive_count = $3
    AND status = 'available'
        "#;

        let query = sqlx::query(base_query)
            .bind(&self.name)
            .bind(receipt.message_id)
            .bind(receipt.receive_count);

        self.update_receipt("DELETE", query, receipt).await
    }

    async fn release(&self, receipt: Receipt, delay: time::Duration) -> QueueResult<()> {
        let base_query = r#"
UPDATE
    talk_event_queue
SET
    visible_at = NOW() + $4
WHERE
    queue = $1
    AND id = $2
    AND receive_count = $3
    AND status = 'available'
        "#;

        let query = sqlx::query(base_query)
            .bind(&self.name)
            .bind(receipt.message_id)
            .bind(receipt.receive_count)
            .bind(delay);

        self.update_receipt("UPDATE", query, receipt).await
    }

    async fn dead_letter(&self, receipt: Receipt, reason: DeadLetterReason) -> QueueResult<()> {
        let base_query = r#"
UPDATE
    talk_event_queue
SET
    status = 'dead'::message_status,
    errors = array_append(errors, $4)
WHERE
    queue = $1
    AND id = $2
    AND receive_count = $3
    AND status = 'available'
        "#;

        let query = sqlx::query(base_query)
            .bind(&self.name)
            .bind(receipt.message_id)
            .bind(receipt.receive_count)
            .bind(sqlx::types::Json(reason));

        self.update_receipt("UPDATE", query, receipt).await
    }
}
