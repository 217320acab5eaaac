use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{ChannelError, DeadLetter, Envelope, MessageChannel, MessageId, Result};

/// Default time a fetched message stays leased before another consumer may
/// take it over.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// PostgreSQL-backed message channel.
///
/// Messages live in `channel_messages` until acknowledged. Ordering within a
/// topic follows the `seq` column, and a requeued message keeps its `seq`, so it
/// stays at the head of its topic.
#[derive(Clone)]
pub struct PostgresChannel {
    pool: PgPool,
    lease: Duration,
}

impl PostgresChannel {
    /// Creates a new PostgreSQL channel.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    /// Sets how long a fetched message stays leased.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_envelope(row: &PgRow) -> Result<Envelope> {
        let delivery_count: i32 = row.try_get("delivery_count")?;
        Ok(Envelope {
            id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            delivery_count: u32::try_from(delivery_count).unwrap_or_default(),
            enqueued_at: row.try_get("enqueued_at")?,
        })
    }
}

#[async_trait]
impl MessageChannel for PostgresChannel {
    async fn publish_payload(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId> {
        let id = MessageId::new();
        sqlx::query(
            r#"
            INSERT INTO channel_messages (id, topic, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(topic)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| ChannelError::PublishFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        Ok(id)
    }

    async fn fetch(&self, topic: &str) -> Result<Option<Envelope>> {
        // The head is locked with SKIP LOCKED so competing consumers never
        // lease the same row; if the head is not yet due nothing is returned.
        let row = sqlx::query(
            r#"
            WITH head AS (
                SELECT seq FROM channel_messages
                WHERE topic = $1 AND (leased_until IS NULL OR leased_until < now())
                ORDER BY seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE channel_messages m
            SET delivery_count = m.delivery_count + 1,
                leased_until = now() + make_interval(secs => $2)
            FROM head
            WHERE m.seq = head.seq AND m.available_at <= now()
            RETURNING m.id, m.topic, m.payload, m.delivery_count, m.enqueued_at
            "#,
        )
        .bind(topic)
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_envelope).transpose()
    }

    async fn ack(&self, envelope: &Envelope) -> Result<()> {
        let result = sqlx::query("DELETE FROM channel_messages WHERE id = $1")
            .bind(envelope.id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChannelError::NotInFlight(envelope.id.as_uuid()));
        }
        Ok(())
    }

    async fn requeue(&self, envelope: &Envelope, delay: Duration) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE channel_messages
            SET leased_until = NULL,
                available_at = now() + make_interval(secs => $2)
            WHERE id = $1
            "#,
        )
        .bind(envelope.id.as_uuid())
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChannelError::NotInFlight(envelope.id.as_uuid()));
        }
        Ok(())
    }

    async fn dead_letter(&self, envelope: &Envelope, reason: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO channel_dead_letters (id, topic, payload, delivery_count, enqueued_at, reason)
            SELECT id, topic, payload, delivery_count, enqueued_at, $2
            FROM channel_messages
            WHERE id = $1
            "#,
        )
        .bind(envelope.id.as_uuid())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ChannelError::NotInFlight(envelope.id.as_uuid()));
        }

        sqlx::query("DELETE FROM channel_messages WHERE id = $1")
            .bind(envelope.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, payload, delivery_count, enqueued_at, reason, dead_lettered_at
            FROM channel_dead_letters
            WHERE topic = $1
            ORDER BY dead_lettered_at ASC
            "#,
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DeadLetter {
                    envelope: Self::row_to_envelope(row)?,
                    reason: row.try_get("reason")?,
                    dead_lettered_at: row.try_get("dead_lettered_at")?,
                })
            })
            .collect()
    }

    async fn pending_count(&self, topic: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_messages WHERE topic = $1")
                .bind(topic)
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
