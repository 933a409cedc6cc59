//! Resources handed out by [`super::MemoryBroker`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{FutureExt, select_all};

use super::MemoryBroker;
use super::group::GroupCoordinator;
use super::log::{PartitionLog, TopicLog, wait_past};
use crate::transport::error::TransportError;
use crate::transport::record::{Offset, OutboundRecord, Record};
use crate::transport::traits::{
    Consumer, PartitionConsumer, SyncProducer, TopicReader, TopicWriter, TransactionalProducer,
};
use crate::utils::{Shutdown, ShutdownTrigger};

pub(crate) struct MemoryWriter {
    broker: MemoryBroker,
    topic: Arc<TopicLog>,
    closed: AtomicBool,
}

impl MemoryWriter {
    pub(crate) fn new(broker: MemoryBroker, topic: Arc<TopicLog>) -> Self {
        Self {
            broker,
            topic,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TopicWriter for MemoryWriter {
    async fn write(&self, record: OutboundRecord) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.broker.produce(&self.topic, record).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub(crate) struct MemoryReader {
    broker: MemoryBroker,
    topic: Arc<TopicLog>,
    cursor: Arc<GroupCoordinator>,
    closed: ShutdownTrigger,
}

impl MemoryReader {
    pub(crate) fn new(
        broker: MemoryBroker,
        topic: Arc<TopicLog>,
        cursor: Arc<GroupCoordinator>,
        start_offset: Offset,
    ) -> Self {
        for partition in topic.partitions() {
            cursor.position_or(topic.name(), partition.index(), || {
                partition.resolve(start_offset)
            });
        }
        Self {
            broker,
            topic,
            cursor,
            closed: ShutdownTrigger::new(),
        }
    }

    fn try_claim(&self) -> Option<Record> {
        self.topic
            .partitions()
            .iter()
            .find_map(|partition| self.cursor.claim_next(partition))
    }
}

#[async_trait]
impl TopicReader for MemoryReader {
    async fn read(&self) -> Result<Record, TransportError> {
        if self.closed.is_triggered() {
            return Err(TransportError::Closed);
        }
        if self.broker.faults().take_read_failure() {
            return Err(TransportError::Broker("injected read failure".to_string()));
        }

        let closed = self.closed.subscribe();
        let mut watermarks: Vec<_> = self.topic.partitions().iter().map(|p| p.watch()).collect();
        loop {
            if closed.is_triggered() {
                return Err(TransportError::Closed);
            }
            for watermark in &mut watermarks {
                watermark.borrow_and_update();
            }
            // claiming is synchronous, so cancelling the read never drops a record
            if let Some(record) = self.try_claim() {
                return Ok(record);
            }

            let changed = select_all(watermarks.iter_mut().map(|rx| rx.changed().boxed()));
            tokio::select! {
                _ = closed.triggered() => return Err(TransportError::Closed),
                (result, _, _) = changed => {
                    if result.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.trigger();
        Ok(())
    }
}

pub(crate) struct MemoryProducer {
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemoryProducer {
    pub(crate) fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SyncProducer for MemoryProducer {
    async fn send(&self, record: OutboundRecord) -> Result<(i32, i64), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let topic = self.broker.topic(&record.topic);
        self.broker.produce(&topic, record).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub(crate) struct MemoryConsumer {
    broker: MemoryBroker,
    closed: ShutdownTrigger,
}

impl MemoryConsumer {
    pub(crate) fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            closed: ShutdownTrigger::new(),
        }
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    fn consume_partition(
        &self,
        topic: &str,
        partition: i32,
        offset: Offset,
    ) -> Result<Box<dyn PartitionConsumer>, TransportError> {
        if self.closed.is_triggered() {
            return Err(TransportError::Closed);
        }
        let log = self.broker.topic(topic);
        let partition = log
            .partition(partition)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })?;
        let next = partition.resolve(offset);
        Ok(Box::new(MemoryPartitionConsumer {
            broker: self.broker.clone(),
            high_watermark: partition.watch(),
            partition,
            next,
            closed: self.closed.subscribe(),
            done: false,
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.trigger();
        Ok(())
    }
}

struct MemoryPartitionConsumer {
    broker: MemoryBroker,
    partition: Arc<PartitionLog>,
    high_watermark: tokio::sync::watch::Receiver<i64>,
    next: i64,
    closed: Shutdown,
    done: bool,
}

#[async_trait]
impl PartitionConsumer for MemoryPartitionConsumer {
    async fn recv(&mut self) -> Option<Result<Record, TransportError>> {
        if self.done || self.closed.is_triggered() {
            return None;
        }
        if self.broker.faults().take_read_failure() {
            return Some(Err(TransportError::Broker(
                "injected read failure".to_string(),
            )));
        }

        let ready = tokio::select! {
            _ = self.closed.triggered() => false,
            ready = wait_past(&mut self.high_watermark, self.next) => ready,
        };
        if !ready {
            return None;
        }
        let record = self.partition.get(self.next)?;
        self.next += 1;
        Some(Ok(record))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.done = true;
        Ok(())
    }
}

/// Records staged by the open transaction, with the log each one goes to.
type Staged = Vec<(Arc<TopicLog>, OutboundRecord)>;

pub(crate) struct MemoryTransactionalProducer {
    broker: MemoryBroker,
    transactional_id: String,
    pending: Mutex<Option<Staged>>,
    closed: AtomicBool,
}

impl MemoryTransactionalProducer {
    pub(crate) fn new(broker: MemoryBroker, transactional_id: &str) -> Self {
        Self {
            broker,
            transactional_id: transactional_id.to_string(),
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionalProducer for MemoryTransactionalProducer {
    async fn begin(&self) -> Result<(), TransportError> {
        self.check_open()?;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return Err(TransportError::TransactionInProgress);
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    async fn send(&self, record: OutboundRecord) -> Result<(), TransportError> {
        self.check_open()?;
        if self.broker.faults().take_write_failure() {
            return Err(TransportError::Broker("injected write failure".to_string()));
        }
        let topic = self.broker.topic(&record.topic);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = pending.as_mut().ok_or(TransportError::NoTransaction)?;
        staged.push((topic, record));
        Ok(())
    }

    async fn commit(&self) -> Result<(), TransportError> {
        self.check_open()?;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_none() {
            return Err(TransportError::NoTransaction);
        }
        // a failed commit leaves the transaction open for the caller to abort
        if self.broker.faults().take_commit_failure() {
            return Err(TransportError::Broker(format!(
                "injected commit failure for {}",
                self.transactional_id
            )));
        }
        for (topic, record) in pending.take().unwrap_or_default() {
            topic.append(record);
        }
        self.broker.record_commit();
        Ok(())
    }

    async fn abort(&self) -> Result<(), TransportError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.take().is_none() {
            return Err(TransportError::NoTransaction);
        }
        self.broker.record_abort();
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.take().is_some() {
            self.broker.record_abort();
        }
        Ok(())
    }
}
