//! Broker transport seams
//!
//! The ranking core talks to the message broker only through these traits:
//! a `Publisher` for outbound change events, an `EventSource` for inbound raw
//! tickers, and a `SeekableConsumer` for start-up repositioning. Payloads are
//! opaque bytes here; encoding lives in `types::envelope`.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors raised by broker operations.
///
/// Unlike data-validation failures, these propagate to the caller so the
/// operator can restart the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("seek on {partition} failed: {reason}")]
    Seek { partition: String, reason: String },

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// A single partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// An inbound record as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    /// Record timestamp, Unix milliseconds
    pub timestamp_ms: i64,
}

impl Message {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// Outbound side of the broker.
#[async_trait]
pub trait Publisher: Send {
    /// Hand one record to the broker. May suspend until the broker accepts it.
    async fn publish(
        &mut self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
        timestamp_ms: i64,
    ) -> Result<(), TransportError>;

    /// Push out anything buffered. Called once on shutdown.
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Inbound side of the broker.
#[async_trait]
pub trait EventSource: Send {
    /// Next record, or `None` once the source is exhausted.
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError>;
}

/// Consumer that can be repositioned by record timestamp.
#[async_trait]
pub trait SeekableConsumer: Send {
    /// Partitions currently assigned to this consumer.
    async fn assignment(&self) -> Result<Vec<TopicPartition>, TransportError>;

    /// First offset whose record timestamp is at or after `timestamp_ms`.
    async fn offset_for_time(
        &self,
        partition: &TopicPartition,
        timestamp_ms: i64,
    ) -> Result<Option<u64>, TransportError>;

    /// Offset of the next record this consumer will read.
    async fn position(&self, partition: &TopicPartition) -> Result<u64, TransportError>;

    /// Move the read cursor.
    async fn seek(&mut self, partition: &TopicPartition, offset: u64)
        -> Result<(), TransportError>;
}
