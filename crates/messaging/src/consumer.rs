use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{MessageChannel, Result};

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handles typed messages delivered from a topic.
///
/// A message is acknowledged only after `handle` returns `Ok`. Any error
/// causes redelivery, so handlers must be idempotent.
#[async_trait]
pub trait MessageHandler<M: Send + 'static>: Send + Sync {
    /// Processes one message.
    async fn handle(&self, message: M) -> std::result::Result<(), HandlerError>;
}

/// Tuning for a consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Deliveries after which a failing message is dead-lettered.
    pub max_deliveries: u32,

    /// Delay before a failed message becomes deliverable again.
    pub retry_delay: Duration,

    /// How long to wait for new messages when the topic is idle.
    pub idle_wait: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            retry_delay: Duration::from_millis(200),
            idle_wait: Duration::from_millis(500),
        }
    }
}

/// What happened to a single delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded and the message was acknowledged.
    Acked,
    /// Handler failed and the message was returned to the head of its topic.
    Requeued,
    /// The message was moved to the dead-letter list.
    DeadLettered,
}

/// Leases the next message on `topic` and runs `handler` on it.
///
/// Returns `None` when nothing was deliverable.
pub async fn process_next<C, M, H>(
    channel: &C,
    topic: &str,
    handler: &H,
    options: &ConsumerOptions,
) -> Result<Option<DeliveryOutcome>>
where
    C: MessageChannel + ?Sized,
    M: DeserializeOwned + Send + 'static,
    H: MessageHandler<M> + ?Sized,
{
    let Some(envelope) = channel.fetch(topic).await? else {
        return Ok(None);
    };

    let message: M = match envelope.decode() {
        Ok(message) => message,
        Err(e) => {
            // Redelivering a payload that cannot be decoded will never succeed.
            warn!(topic, message_id = %envelope.id, error = %e, "Dead-lettering undecodable message");
            channel
                .dead_letter(&envelope, &format!("undecodable payload: {e}"))
                .await?;
            metrics::counter!("channel_messages_dead_lettered_total", "topic" => topic.to_string())
                .increment(1);
            return Ok(Some(DeliveryOutcome::DeadLettered));
        }
    };

    match handler.handle(message).await {
        Ok(()) => {
            channel.ack(&envelope).await?;
            debug!(topic, message_id = %envelope.id, "Message acknowledged");
            Ok(Some(DeliveryOutcome::Acked))
        }
        Err(e) if envelope.delivery_count >= options.max_deliveries => {
            error!(
                topic,
                message_id = %envelope.id,
                deliveries = envelope.delivery_count,
                error = %e,
                "Message exhausted its deliveries, dead-lettering"
            );
            channel.dead_letter(&envelope, &e.to_string()).await?;
            metrics::counter!("channel_messages_dead_lettered_total", "topic" => topic.to_string())
                .increment(1);
            Ok(Some(DeliveryOutcome::DeadLettered))
        }
        Err(e) => {
            warn!(
                topic,
                message_id = %envelope.id,
                deliveries = envelope.delivery_count,
                error = %e,
                "Handler failed, requeueing message"
            );
            channel.requeue(&envelope, options.retry_delay).await?;
            metrics::counter!("channel_messages_redelivered_total", "topic" => topic.to_string())
                .increment(1);
            Ok(Some(DeliveryOutcome::Requeued))
        }
    }
}

/// Processes messages until nothing on `topic` is deliverable.
///
/// Returns the number of deliveries handled. Mostly useful in tests, where it
/// gives a deterministic alternative to a background consumer.
pub async fn drain<C, M, H>(
    channel: &C,
    topic: &str,
    handler: &H,
    options: &ConsumerOptions,
) -> Result<usize>
where
    C: MessageChannel + ?Sized,
    M: DeserializeOwned + Send + 'static,
    H: MessageHandler<M> + ?Sized,
{
    let mut handled = 0;
    while process_next(channel, topic, handler, options).await?.is_some() {
        handled += 1;
    }
    Ok(handled)
}

/// Handle to a running background consumer.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signals the consumer to stop and waits for the in-flight message to
    /// finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Consumer task panicked");
        }
    }
}

/// Spawns a background task consuming `topic` one message at a time.
pub fn consume<C, M, H>(
    channel: Arc<C>,
    topic: impl Into<String>,
    handler: Arc<H>,
    options: ConsumerOptions,
) -> ConsumerHandle
where
    C: MessageChannel + ?Sized + 'static,
    M: DeserializeOwned + Send + 'static,
    H: MessageHandler<M> + ?Sized + 'static,
{
    let topic = topic.into();
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(topic = %topic, "Consumer started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match process_next::<C, M, H>(&channel, &topic, &handler, &options).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = channel.wait_for_message(&topic, options.idle_wait) => {}
                    }
                }
                Err(e) => {
                    error!(topic = %topic, error = %e, "Channel error while consuming");
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(options.idle_wait) => {}
                    }
                }
            }
        }
        tracing::info!(topic = %topic, "Consumer stopped");
    });

    ConsumerHandle { shutdown, task }
}
