//! PostgreSQL channel integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p messaging --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use messaging::{
    ChannelError, ConsumerOptions, DeliveryOutcome, HandlerError, MessageChannel,
    MessageChannelExt, MessageHandler, PostgresChannel, drain, process_next,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{Mutex, OnceCell};

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/003_create_channel_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_channel() -> PostgresChannel {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE channel_messages, channel_dead_letters")
        .execute(&pool)
        .await
        .unwrap();

    PostgresChannel::new(pool)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    n: u32,
}

struct Recorder {
    fail_first: Mutex<bool>,
    seen: Mutex<Vec<u32>>,
}

#[async_trait::async_trait]
impl MessageHandler<Ping> for Recorder {
    async fn handle(&self, message: Ping) -> Result<(), HandlerError> {
        let mut fail_first = self.fail_first.lock().await;
        if *fail_first {
            *fail_first = false;
            return Err("first attempt fails".into());
        }
        self.seen.lock().await.push(message.n);
        Ok(())
    }
}

fn options() -> ConsumerOptions {
    ConsumerOptions {
        max_deliveries: 3,
        retry_delay: Duration::ZERO,
        idle_wait: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_publish_fetch_ack() {
    let channel = get_test_channel().await;

    channel.publish("pings", &Ping { n: 1 }).await.unwrap();
    assert_eq!(channel.pending_count("pings").await.unwrap(), 1);

    let envelope = channel.fetch("pings").await.unwrap().unwrap();
    assert_eq!(envelope.delivery_count, 1);
    assert_eq!(envelope.payload["n"], 1);

    // Leased messages are invisible to other fetches
    assert!(channel.fetch("pings").await.unwrap().is_none());

    channel.ack(&envelope).await.unwrap();
    assert_eq!(channel.pending_count("pings").await.unwrap(), 0);
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let channel = get_test_channel().await;

    channel.publish("a", &Ping { n: 1 }).await.unwrap();
    assert!(channel.fetch("b").await.unwrap().is_none());
    assert!(channel.fetch("a").await.unwrap().is_some());
}

#[tokio::test]
async fn test_requeued_message_keeps_head_position() {
    let channel = get_test_channel().await;
    let handler = Recorder {
        fail_first: Mutex::new(true),
        seen: Mutex::new(Vec::new()),
    };

    for n in 1..=3 {
        channel.publish("pings", &Ping { n }).await.unwrap();
    }

    let first = process_next(&channel, "pings", &handler, &options())
        .await
        .unwrap();
    assert_eq!(first, Some(DeliveryOutcome::Requeued));

    drain(&channel, "pings", &handler, &options()).await.unwrap();
    assert_eq!(*handler.seen.lock().await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_delayed_requeue_is_not_fetched_early() {
    let channel = get_test_channel().await;
    channel.publish("pings", &Ping { n: 1 }).await.unwrap();

    let envelope = channel.fetch("pings").await.unwrap().unwrap();
    channel
        .requeue(&envelope, Duration::from_secs(60))
        .await
        .unwrap();

    assert!(channel.fetch("pings").await.unwrap().is_none());
    assert_eq!(channel.pending_count("pings").await.unwrap(), 1);
}

#[tokio::test]
async fn test_expired_lease_is_redelivered() {
    let channel = get_test_channel()
        .await
        .with_lease(Duration::from_millis(50));
    channel.publish("pings", &Ping { n: 1 }).await.unwrap();

    let first = channel.fetch("pings").await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let second = channel.fetch("pings").await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.delivery_count, 2);
}

#[tokio::test]
async fn test_dead_letter_moves_message() {
    let channel = get_test_channel().await;
    channel
        .publish("pings", &serde_json::json!({"bad": true}))
        .await
        .unwrap();

    let handler = Recorder {
        fail_first: Mutex::new(false),
        seen: Mutex::new(Vec::new()),
    };
    let outcome = process_next(&channel, "pings", &handler, &options())
        .await
        .unwrap();
    assert_eq!(outcome, Some(DeliveryOutcome::DeadLettered));

    assert_eq!(channel.pending_count("pings").await.unwrap(), 0);
    let dead = channel.dead_letters("pings").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.starts_with("undecodable payload"));
}

#[tokio::test]
async fn test_ack_twice_fails() {
    let channel = get_test_channel().await;
    channel.publish("pings", &Ping { n: 1 }).await.unwrap();

    let envelope = channel.fetch("pings").await.unwrap().unwrap();
    channel.ack(&envelope).await.unwrap();

    let result = channel.ack(&envelope).await;
    assert!(matches!(result, Err(ChannelError::NotInFlight(_))));
}
