//! Broker connection port.
//!
//! These traits are the primitives every client in the crate is written
//! against. An adapter for a concrete broker implements [`Connection`] and
//! hands out the per-resource objects below; [`super::MemoryBroker`] is the
//! in-process adapter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::record::{Offset, OutboundRecord, Record};
use crate::utils::Shutdown;

/// Address list and identity used when opening a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub brokers: Vec<String>,
    pub client_id: String,
}

impl ConnectOptions {
    pub fn new(brokers: Vec<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers,
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub topic: String,
    /// Readers sharing a group id compete for records and share committed
    /// positions. `None` gives the reader a private cursor.
    pub group_id: Option<String>,
    pub start_offset: Offset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOptions {
    pub group_id: String,
    pub initial_offset: Offset,
}

/// Factory for every broker-backed resource a client owns.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Round trip to the cluster without touching any topic.
    async fn ping(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    fn writer(
        &self,
        options: &ConnectOptions,
        topic: &str,
    ) -> Result<Arc<dyn TopicWriter>, TransportError>;

    fn reader(
        &self,
        options: &ConnectOptions,
        reader: ReaderOptions,
    ) -> Result<Arc<dyn TopicReader>, TransportError>;

    fn sync_producer(&self, options: &ConnectOptions)
    -> Result<Box<dyn SyncProducer>, TransportError>;

    fn consumer(&self, options: &ConnectOptions) -> Result<Box<dyn Consumer>, TransportError>;

    fn consumer_group(
        &self,
        options: &ConnectOptions,
        group: GroupOptions,
    ) -> Result<Box<dyn ConsumerGroup>, TransportError>;

    fn transactional_producer(
        &self,
        options: &ConnectOptions,
        transactional_id: &str,
    ) -> Result<Box<dyn TransactionalProducer>, TransportError>;
}

/// Writes records to a single topic.
#[async_trait]
pub trait TopicWriter: Send + Sync {
    async fn write(&self, record: OutboundRecord) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Reads records from a single topic.
#[async_trait]
pub trait TopicReader: Send + Sync {
    /// Waits for the next record. Must be cancel safe: dropping the future
    /// before it resolves must not lose a record.
    async fn read(&self) -> Result<Record, TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SyncProducer: Send + Sync {
    /// Sends one record and waits for the broker's acknowledgement, returning
    /// the partition and offset it was stored at.
    async fn send(&self, record: OutboundRecord) -> Result<(i32, i64), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    fn consume_partition(
        &self,
        topic: &str,
        partition: i32,
        offset: Offset,
    ) -> Result<Box<dyn PartitionConsumer>, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Stream of records from one partition.
#[async_trait]
pub trait PartitionConsumer: Send {
    /// `Some(Err(_))` reports a consumer error without ending the stream;
    /// `None` means the consumer was closed. Cancel safe.
    async fn recv(&mut self) -> Option<Result<Record, TransportError>>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// View of the current group generation handed to claim handlers.
pub trait GroupSession: Send + Sync {
    fn member_id(&self) -> &str;
    fn generation(&self) -> u64;
    /// Marks `record` as processed; its offset is committed for the group.
    fn mark_message(&self, record: &Record);
}

/// Records of one partition assigned to this member for one generation.
#[derive(Debug)]
pub struct Claim {
    topic: String,
    partition: i32,
    initial_offset: i64,
    messages: mpsc::Receiver<Record>,
}

impl Claim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        initial_offset: i64,
        messages: mpsc::Receiver<Record>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            initial_offset,
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn initial_offset(&self) -> i64 {
        self.initial_offset
    }

    /// Next record of the claim; `None` once the session ends.
    pub async fn recv(&mut self) -> Option<Record> {
        self.messages.recv().await
    }
}

#[async_trait]
pub trait ClaimHandler: Send + Sync {
    async fn setup(&self, _session: &dyn GroupSession) -> Result<(), TransportError> {
        Ok(())
    }

    async fn cleanup(&self, _session: &dyn GroupSession) -> Result<(), TransportError> {
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: &mut Claim,
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// Joins the group and runs one session: claims are handed to `handler`
    /// until the group rebalances or `shutdown` fires. Callers loop to rejoin.
    async fn consume(
        &self,
        topics: &[String],
        handler: &dyn ClaimHandler,
        shutdown: Shutdown,
    ) -> Result<(), TransportError>;

    /// Withdraws the membership `consume` registered for `topics`, handing
    /// its partitions to the remaining members. Leaving a topic set that
    /// never joined is a no-op.
    async fn leave(&self, topics: &[String]) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait TransactionalProducer: Send + Sync {
    async fn begin(&self) -> Result<(), TransportError>;
    async fn send(&self, record: OutboundRecord) -> Result<(), TransportError>;
    async fn commit(&self) -> Result<(), TransportError>;
    async fn abort(&self) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}
