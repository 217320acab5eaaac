use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Unique identifier for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as stored in, and leased from, a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message ID.
    pub id: MessageId,

    /// Topic the message was published to.
    pub topic: String,

    /// JSON payload.
    pub payload: serde_json::Value,

    /// How many times this message has been handed to a consumer, including
    /// the current lease.
    pub delivery_count: u32,

    /// When the message was first published.
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    /// Creates a fresh, never-delivered envelope.
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: MessageId::new(),
            topic: topic.into(),
            payload,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Deserializes the payload into a typed message.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }

    /// Returns true if this lease is a redelivery.
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// A message that was removed from its topic because it could not be handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The envelope as it was last delivered.
    pub envelope: Envelope,

    /// Why the message was dead-lettered.
    pub reason: String,

    /// When it was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn test_new_envelope_is_undelivered() {
        let envelope = Envelope::new("pings", serde_json::json!({"n": 1}));
        assert_eq!(envelope.topic, "pings");
        assert_eq!(envelope.delivery_count, 0);
        assert!(!envelope.is_redelivery());
    }

    #[test]
    fn test_decode_typed_payload() {
        let envelope = Envelope::new("pings", serde_json::json!({"n": 7}));
        let ping: Ping = envelope.decode().unwrap();
        assert_eq!(ping, Ping { n: 7 });
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let envelope = Envelope::new("pings", serde_json::json!({"unexpected": true}));
        assert!(envelope.decode::<Ping>().is_err());
    }
}
