use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{ChannelError, DeadLetter, Envelope, MessageChannel, MessageId, Result};

#[derive(Debug)]
struct Queued {
    envelope: Envelope,
    available_at: Instant,
}

#[derive(Debug, Default)]
struct TopicQueue {
    ready: VecDeque<Queued>,
    in_flight: HashMap<MessageId, Envelope>,
    dead: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
struct InMemoryChannelState {
    topics: HashMap<String, TopicQueue>,
    fail_on_publish: bool,
}

/// In-memory channel for tests and single-process deployments.
///
/// Provides the same ordering and acknowledgement semantics as the PostgreSQL
/// channel, without surviving a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<Mutex<InMemoryChannelState>>,
    notify: Arc<Notify>,
}

impl InMemoryChannel {
    /// Creates a new empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the channel to reject every publish.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.lock().await.fail_on_publish = fail;
    }

    /// Returns the payloads waiting on `topic`, head first, excluding leased
    /// messages.
    pub async fn queued_payloads(&self, topic: &str) -> Vec<serde_json::Value> {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|q| q.ready.iter().map(|m| m.envelope.payload.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish_payload(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId> {
        let mut state = self.state.lock().await;
        if state.fail_on_publish {
            return Err(ChannelError::PublishFailed {
                topic: topic.to_string(),
                reason: "channel unavailable".to_string(),
            });
        }

        let envelope = Envelope::new(topic, payload);
        let id = envelope.id;
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .ready
            .push_back(Queued {
                envelope,
                available_at: Instant::now(),
            });
        drop(state);

        self.notify.notify_waiters();
        Ok(id)
    }

    async fn fetch(&self, topic: &str) -> Result<Option<Envelope>> {
        let mut state = self.state.lock().await;
        let Some(queue) = state.topics.get_mut(topic) else {
            return Ok(None);
        };

        // Only the head is eligible, so a delayed redelivery holds back the
        // messages published after it.
        let head_due = queue
            .ready
            .front()
            .is_some_and(|m| m.available_at <= Instant::now());
        if !head_due {
            return Ok(None);
        }

        let Some(queued) = queue.ready.pop_front() else {
            return Ok(None);
        };
        let mut envelope = queued.envelope;
        envelope.delivery_count += 1;
        queue.in_flight.insert(envelope.id, envelope.clone());
        Ok(Some(envelope))
    }

    async fn ack(&self, envelope: &Envelope) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .topics
            .get_mut(&envelope.topic)
            .and_then(|q| q.in_flight.remove(&envelope.id))
            .map(|_| ())
            .ok_or(ChannelError::NotInFlight(envelope.id.as_uuid()))
    }

    async fn requeue(&self, envelope: &Envelope, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let queue = state
            .topics
            .get_mut(&envelope.topic)
            .ok_or(ChannelError::NotInFlight(envelope.id.as_uuid()))?;
        let leased = queue
            .in_flight
            .remove(&envelope.id)
            .ok_or(ChannelError::NotInFlight(envelope.id.as_uuid()))?;

        queue.ready.push_front(Queued {
            envelope: leased,
            available_at: Instant::now() + delay,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, envelope: &Envelope, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let queue = state
            .topics
            .get_mut(&envelope.topic)
            .ok_or(ChannelError::NotInFlight(envelope.id.as_uuid()))?;
        let leased = queue
            .in_flight
            .remove(&envelope.id)
            .ok_or(ChannelError::NotInFlight(envelope.id.as_uuid()))?;

        queue.dead.push(DeadLetter {
            envelope: leased,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        Ok(state
            .topics
            .get(topic)
            .map(|q| q.dead.clone())
            .unwrap_or_default())
    }

    async fn pending_count(&self, topic: &str) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state
            .topics
            .get(topic)
            .map(|q| q.ready.len() + q.in_flight.len())
            .unwrap_or(0))
    }

    async fn wait_for_message(&self, _topic: &str, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageChannelExt;

    #[tokio::test]
    async fn test_publish_and_fetch_in_order() {
        let channel = InMemoryChannel::new();
        channel.publish("t", &serde_json::json!({"n": 1})).await.unwrap();
        channel.publish("t", &serde_json::json!({"n": 2})).await.unwrap();

        let first = channel.fetch("t").await.unwrap().unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(first.delivery_count, 1);
        channel.ack(&first).await.unwrap();

        let second = channel.fetch("t").await.unwrap().unwrap();
        assert_eq!(second.payload["n"], 2);
        channel.ack(&second).await.unwrap();

        assert!(channel.fetch("t").await.unwrap().is_none());
        assert_eq!(channel.pending_count("t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requeue_returns_message_to_head() {
        let channel = InMemoryChannel::new();
        channel.publish("t", &serde_json::json!({"n": 1})).await.unwrap();
        channel.publish("t", &serde_json::json!({"n": 2})).await.unwrap();

        let first = channel.fetch("t").await.unwrap().unwrap();
        channel.requeue(&first, Duration::ZERO).await.unwrap();

        let again = channel.fetch("t").await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.delivery_count, 2);
        assert!(again.is_redelivery());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_requeue_holds_back_topic() {
        let channel = InMemoryChannel::new();
        channel.publish("t", &serde_json::json!({"n": 1})).await.unwrap();
        channel.publish("t", &serde_json::json!({"n": 2})).await.unwrap();

        let first = channel.fetch("t").await.unwrap().unwrap();
        channel
            .requeue(&first, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(channel.fetch("t").await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(150)).await;
        let again = channel.fetch("t").await.unwrap().unwrap();
        assert_eq!(again.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_leased_message_counts_as_pending() {
        let channel = InMemoryChannel::new();
        channel.publish("t", &serde_json::json!({})).await.unwrap();
        let _leased = channel.fetch("t").await.unwrap().unwrap();
        assert_eq!(channel.pending_count("t").await.unwrap(), 1);
        assert!(channel.queued_payloads("t").await.is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_removes_from_topic() {
        let channel = InMemoryChannel::new();
        channel.publish("t", &serde_json::json!({"n": 1})).await.unwrap();
        let leased = channel.fetch("t").await.unwrap().unwrap();
        channel.dead_letter(&leased, "poison").await.unwrap();

        assert_eq!(channel.pending_count("t").await.unwrap(), 0);
        let dead = channel.dead_letters("t").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "poison");
        assert_eq!(dead[0].envelope.id, leased.id);
    }

    #[tokio::test]
    async fn test_ack_unknown_message_fails() {
        let channel = InMemoryChannel::new();
        let stray = Envelope::new("t", serde_json::json!({}));
        assert!(matches!(
            channel.ack(&stray).await,
            Err(ChannelError::NotInFlight(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let channel = InMemoryChannel::new();
        channel.set_fail_on_publish(true).await;
        let result = channel.publish("t", &serde_json::json!({})).await;
        assert!(matches!(result, Err(ChannelError::PublishFailed { .. })));
        assert_eq!(channel.pending_count("t").await.unwrap(), 0);
    }
}
