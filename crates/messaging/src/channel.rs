use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{DeadLetter, Envelope, MessageId, Result};

/// Core trait for durable message channels.
///
/// A channel keeps one ordered queue per topic. Messages are leased with
/// [`fetch`](MessageChannel::fetch) and stay owned by the channel until the
/// consumer acknowledges, requeues, or dead-letters them. A lease that is never
/// settled (for example because the consumer crashed) must eventually make the
/// message deliverable again, which is what gives at-least-once delivery.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Appends a JSON payload to the tail of `topic`.
    async fn publish_payload(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId>;

    /// Leases the message at the head of `topic`.
    ///
    /// Returns None when the topic is empty or its head is not yet due for
    /// redelivery. The returned envelope has its delivery count incremented.
    async fn fetch(&self, topic: &str) -> Result<Option<Envelope>>;

    /// Acknowledges a leased message, removing it permanently.
    async fn ack(&self, envelope: &Envelope) -> Result<()>;

    /// Returns a leased message to the head of its topic, deliverable again
    /// after `delay`.
    async fn requeue(&self, envelope: &Envelope, delay: Duration) -> Result<()>;

    /// Moves a leased message to the dead-letter list of its topic.
    async fn dead_letter(&self, envelope: &Envelope, reason: &str) -> Result<()>;

    /// Returns the dead letters recorded for `topic`, oldest first.
    async fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>>;

    /// Returns the number of messages on `topic` that are not yet acknowledged,
    /// including leased ones.
    async fn pending_count(&self, topic: &str) -> Result<usize>;

    /// Waits until a message may have become available on `topic`, or until
    /// `timeout` elapses.
    async fn wait_for_message(&self, _topic: &str, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait MessageChannelExt: MessageChannel {
    /// Serializes `message` to JSON and publishes it to `topic`.
    async fn publish<T>(&self, topic: &str, message: &T) -> Result<MessageId>
    where
        T: Serialize + Sync,
    {
        let payload = serde_json::to_value(message)?;
        let id = self.publish_payload(topic, payload).await?;
        metrics::counter!("channel_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        Ok(id)
    }
}

// Blanket implementation for all MessageChannel implementations
impl<T: MessageChannel + ?Sized> MessageChannelExt for T {}
