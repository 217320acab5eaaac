//! Durable, at-least-once message channel.
//!
//! Producers publish typed messages onto named topics. A consumer leases one
//! message at a time per topic, runs its handler, and only then acknowledges
//! the message. A failed handler requeues the message at the head of its
//! topic, so delivery order within a topic is preserved across retries.
//! Messages that keep failing are moved to a dead-letter list.

pub mod channel;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod postgres;

pub use channel::{MessageChannel, MessageChannelExt};
pub use consumer::{
    ConsumerHandle, ConsumerOptions, DeliveryOutcome, HandlerError, MessageHandler, consume,
    drain, process_next,
};
pub use envelope::{DeadLetter, Envelope, MessageId};
pub use error::{ChannelError, Result};
pub use memory::InMemoryChannel;
pub use postgres::PostgresChannel;
