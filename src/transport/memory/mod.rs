//! In-process broker.
//!
//! `MemoryBroker` keeps partitioned logs in memory and implements
//! [`Connection`], so every client in the crate can run in a single process
//! without an external broker. Clones share the same logs.

mod client;
mod faults;
pub(crate) mod group;
mod log;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

pub use faults::Faults;

use self::client::{
    MemoryConsumer, MemoryProducer, MemoryReader, MemoryTransactionalProducer, MemoryWriter,
};
use self::group::{GroupCoordinator, MemoryConsumerGroup};
use self::log::TopicLog;
use super::error::TransportError;
use super::record::{OutboundRecord, Record};
use super::traits::{
    ConnectOptions, Connection, Consumer, ConsumerGroup, GroupOptions, ReaderOptions,
    SyncProducer, TopicReader, TopicWriter, TransactionalProducer,
};

/// Committed and aborted transaction counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub committed: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

#[derive(Debug)]
struct BrokerState {
    default_partitions: usize,
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    groups: Mutex<HashMap<String, Arc<GroupCoordinator>>>,
    faults: Faults,
    committed_transactions: AtomicU64,
    aborted_transactions: AtomicU64,
}

impl MemoryBroker {
    /// Topics get a single partition unless created explicitly.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            state: Arc::new(BrokerState {
                default_partitions: partitions.max(1),
                topics: RwLock::new(HashMap::new()),
                groups: Mutex::new(HashMap::new()),
                faults: Faults::default(),
                committed_transactions: AtomicU64::new(0),
                aborted_transactions: AtomicU64::new(0),
            }),
        }
    }

    /// Creates `name` with `partitions` partitions. Returns `false` if the
    /// topic already exists, in which case it is left untouched.
    pub fn create_topic(&self, name: &str, partitions: usize) -> bool {
        let mut topics = self
            .state
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if topics.contains_key(name) {
            return false;
        }
        topics.insert(name.to_string(), Arc::new(TopicLog::new(name, partitions)));
        true
    }

    pub fn faults(&self) -> &Faults {
        &self.state.faults
    }

    /// Every record of `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.existing_topic(topic)
            .map(|log| log.records())
            .unwrap_or_default()
    }

    pub fn partition_count(&self, topic: &str) -> Option<i32> {
        self.existing_topic(topic).map(|log| log.partition_count())
    }

    /// Appends directly to the log, bypassing fault injection.
    pub fn append(&self, record: OutboundRecord) -> (i32, i64) {
        self.topic(&record.topic).append(record)
    }

    /// Next offset the group will read from `topic`/`partition`.
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        let groups = self
            .state
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        groups.get(group_id)?.committed(topic, partition)
    }

    /// Members currently joined to `group_id`.
    pub fn group_members(&self, group_id: &str) -> usize {
        let groups = self
            .state
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        groups.get(group_id).map_or(0, |group| group.member_count())
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.state.committed_transactions.load(Ordering::SeqCst),
            aborted: self.state.aborted_transactions.load(Ordering::SeqCst),
        }
    }

    fn existing_topic(&self, name: &str) -> Option<Arc<TopicLog>> {
        self.state
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn topic(&self, name: &str) -> Arc<TopicLog> {
        if let Some(log) = self.existing_topic(name) {
            return log;
        }
        let mut topics = self
            .state
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TopicLog::new(name, self.state.default_partitions))),
        )
    }

    fn group(&self, group_id: &str) -> Arc<GroupCoordinator> {
        let mut groups = self
            .state
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            groups
                .entry(group_id.to_string())
                .or_insert_with(|| Arc::new(GroupCoordinator::new())),
        )
    }

    pub(crate) async fn produce(
        &self,
        topic: &TopicLog,
        record: OutboundRecord,
    ) -> Result<(i32, i64), TransportError> {
        if let Some(latency) = self.faults().write_latency() {
            tokio::time::sleep(latency).await;
        }
        if self.faults().take_write_failure() {
            return Err(TransportError::Broker("injected write failure".to_string()));
        }
        Ok(topic.append(record))
    }

    pub(crate) fn record_commit(&self) {
        self.state
            .committed_transactions
            .fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_abort(&self) {
        self.state.aborted_transactions.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn check_brokers(options: &ConnectOptions) -> Result<(), TransportError> {
    if options.brokers.iter().all(|broker| broker.trim().is_empty()) {
        return Err(TransportError::NoBrokers);
    }
    Ok(())
}

#[async_trait]
impl Connection for MemoryBroker {
    async fn ping(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        check_brokers(options)?;
        if self.faults().take_ping_failure() {
            return Err(TransportError::Broker("injected ping failure".to_string()));
        }
        Ok(())
    }
    fn writer(
        &self,
        options: &ConnectOptions,
        topic: &str,
    ) -> Result<Arc<dyn TopicWriter>, TransportError> {
        check_brokers(options)?;
        Ok(Arc::new(MemoryWriter::new(self.clone(), self.topic(topic))))
    }

    fn reader(
        &self,
        options: &ConnectOptions,
        reader: ReaderOptions,
    ) -> Result<Arc<dyn TopicReader>, TransportError> {
        check_brokers(options)?;
        let cursor = match &reader.group_id {
            Some(group_id) => self.group(group_id),
            None => Arc::new(GroupCoordinator::new()),
        };
        Ok(Arc::new(MemoryReader::new(
            self.clone(),
            self.topic(&reader.topic),
            cursor,
            reader.start_offset,
        )))
    }

    fn sync_producer(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn SyncProducer>, TransportError> {
        check_brokers(options)?;
        Ok(Box::new(MemoryProducer::new(self.clone())))
    }

    fn consumer(&self, options: &ConnectOptions) -> Result<Box<dyn Consumer>, TransportError> {
        check_brokers(options)?;
        Ok(Box::new(MemoryConsumer::new(self.clone())))
    }

    fn consumer_group(
        &self,
        options: &ConnectOptions,
        group: GroupOptions,
    ) -> Result<Box<dyn ConsumerGroup>, TransportError> {
        check_brokers(options)?;
        let member_id = format!("{}-{}", options.client_id, Uuid::new_v4());
        Ok(Box::new(MemoryConsumerGroup::new(
            self.clone(),
            self.group(&group.group_id),
            member_id,
            group.initial_offset,
        )))
    }

    fn transactional_producer(
        &self,
        options: &ConnectOptions,
        transactional_id: &str,
    ) -> Result<Box<dyn TransactionalProducer>, TransportError> {
        check_brokers(options)?;
        if transactional_id.is_empty() {
            return Err(TransportError::Broker(
                "transactional producer requires a transactional id".to_string(),
            ));
        }
        Ok(Box::new(MemoryTransactionalProducer::new(
            self.clone(),
            transactional_id,
        )))
    }
}
