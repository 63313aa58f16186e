//! In-process broker
//!
//! A partitioned, timestamped, append-only topic log with the same surface
//! the ranking core expects from a real broker: keyed partitioning, offsets,
//! timestamp lookup, and seekable consumers. Used for replaying captured
//! tickers and in tests.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rustc_hash::FxHasher;
use tracing::debug;

use crate::transport::{
    EventSource, Message, Publisher, SeekableConsumer, TopicPartition, TransportError,
};

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp_ms: i64,
    /// Position in the broker-wide append order
    pub log_index: u64,
}

#[derive(Debug, Default)]
struct Log {
    topics: BTreeMap<String, Vec<Vec<Record>>>,
    appended: u64,
}

/// Shared handle to an in-process topic log.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Log>>,
    default_partitions: u32,
}

impl MemoryBroker {
    /// Topics created implicitly on first publish get `default_partitions`.
    pub fn new(default_partitions: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Log::default())),
            default_partitions: default_partitions.max(1),
        }
    }

    /// Create a topic with an explicit partition count. No-op if it exists.
    pub fn create_topic(&self, topic: &str, partitions: u32) -> Result<(), TransportError> {
        let mut log = self.log()?;
        log.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
        Ok(())
    }

    /// Append a record, creating the topic if needed.
    ///
    /// Keyed records land on `hash(key) % partitions`; unkeyed on partition 0.
    pub fn append(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        timestamp_ms: i64,
    ) -> Result<(u32, u64), TransportError> {
        let default_partitions = self.default_partitions as usize;
        let mut log = self.log()?;
        let log_index = log.appended;

        let partitions = log
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); default_partitions]);
        let partition = partition_for(key, partitions.len());
        let records = &mut partitions[partition];
        let offset = records.len() as u64;
        records.push(Record {
            offset,
            key: key.map(str::to_string),
            payload,
            timestamp_ms,
            log_index,
        });
        log.appended += 1;

        Ok((partition as u32, offset))
    }

    /// Partitions of a topic, or an empty list if it does not exist.
    pub fn partitions(&self, topic: &str) -> Result<Vec<TopicPartition>, TransportError> {
        let log = self.log()?;
        Ok(log
            .topics
            .get(topic)
            .map(|parts| {
                (0..parts.len() as u32)
                    .map(|p| TopicPartition::new(topic, p))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// All records of a topic in append order.
    pub fn records(&self, topic: &str) -> Result<Vec<Record>, TransportError> {
        self.records_in_order(&[topic])
    }

    /// Records of several topics merged in broker-wide append order.
    pub fn records_in_order(&self, topics: &[&str]) -> Result<Vec<Record>, TransportError> {
        let log = self.log()?;
        let mut out: Vec<Record> = topics
            .iter()
            .filter_map(|t| log.topics.get(*t))
            .flat_map(|parts| parts.iter().flatten().cloned())
            .collect();
        out.sort_by_key(|r| r.log_index);
        Ok(out)
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
        }
    }

    /// Consumer subscribed to `topics`, positioned at the start of each partition.
    pub fn consumer(&self, topics: &[&str]) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            positions: BTreeMap::new(),
            cursor: 0,
        }
    }

    fn log(&self) -> Result<MutexGuard<'_, Log>, TransportError> {
        self.inner
            .lock()
            .map_err(|_| TransportError::Unavailable("memory broker lock poisoned".to_string()))
    }
}

fn partition_for(key: Option<&str>, partitions: usize) -> usize {
    match key {
        Some(k) => {
            // Fixed algorithm over the raw key bytes, so placement is stable
            // across runs and toolchains.
            let mut hasher = FxHasher::default();
            hasher.write(k.as_bytes());
            (hasher.finish() % partitions as u64) as usize
        }
        None => 0,
    }
}

/// Publisher writing into a `MemoryBroker`.
#[derive(Debug, Clone)]
pub struct MemoryProducer {
    broker: MemoryBroker,
}

#[async_trait]
impl Publisher for MemoryProducer {
    async fn publish(
        &mut self,
        topic: &str,
        key: Option<&str>,
        value: Vec<u8>,
        timestamp_ms: i64,
    ) -> Result<(), TransportError> {
        let (partition, offset) = self.broker.append(topic, key, value, timestamp_ms)?;
        debug!(topic, partition, offset, "Record appended");
        Ok(())
    }
}

/// Consumer reading from a `MemoryBroker`.
///
/// Partitions are read round-robin, one record at a time; order within a
/// partition is preserved.
#[derive(Debug)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    topics: Vec<String>,
    positions: BTreeMap<TopicPartition, u64>,
    cursor: usize,
}

impl MemoryConsumer {
    fn assigned(&self) -> Result<Vec<TopicPartition>, TransportError> {
        let mut out = Vec::new();
        for topic in &self.topics {
            out.extend(self.broker.partitions(topic)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl EventSource for MemoryConsumer {
    async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        let assigned = self.assigned()?;
        if assigned.is_empty() {
            return Ok(None);
        }

        let log = self.broker.log()?;
        for step in 0..assigned.len() {
            let tp = &assigned[(self.cursor + step) % assigned.len()];
            let position = self.positions.get(tp).copied().unwrap_or(0);
            let record = log
                .topics
                .get(&tp.topic)
                .and_then(|parts| parts.get(tp.partition as usize))
                .and_then(|records| records.get(position as usize));

            if let Some(record) = record {
                let message = Message {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    offset: record.offset,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                    timestamp_ms: record.timestamp_ms,
                };
                self.positions.insert(tp.clone(), position + 1);
                self.cursor = (self.cursor + step + 1) % assigned.len();
                return Ok(Some(message));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl SeekableConsumer for MemoryConsumer {
    async fn assignment(&self) -> Result<Vec<TopicPartition>, TransportError> {
        self.assigned()
    }

    async fn offset_for_time(
        &self,
        partition: &TopicPartition,
        timestamp_ms: i64,
    ) -> Result<Option<u64>, TransportError> {
        let log = self.broker.log()?;
        let records = log
            .topics
            .get(&partition.topic)
            .and_then(|parts| parts.get(partition.partition as usize))
            .ok_or_else(|| TransportError::UnknownTopic(partition.to_string()))?;
        Ok(records
            .iter()
            .find(|r| r.timestamp_ms >= timestamp_ms)
            .map(|r| r.offset))
    }

    async fn position(&self, partition: &TopicPartition) -> Result<u64, TransportError> {
        Ok(self.positions.get(partition).copied().unwrap_or(0))
    }

    async fn seek(
        &mut self,
        partition: &TopicPartition,
        offset: u64,
    ) -> Result<(), TransportError> {
        if !self.assigned()?.contains(partition) {
            return Err(TransportError::Seek {
                partition: partition.to_string(),
                reason: "partition not assigned".to_string(),
            });
        }
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }
}
