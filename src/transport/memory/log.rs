//! Partitioned append-only log backing each in-memory topic.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;

use crate::transport::record::{Offset, OutboundRecord, Record};

#[derive(Debug)]
pub(crate) struct TopicLog {
    name: String,
    partitions: Vec<Arc<PartitionLog>>,
    round_robin: AtomicUsize,
}

impl TopicLog {
    pub(crate) fn new(name: &str, partitions: usize) -> Self {
        let partitions = (0..partitions.max(1))
            .map(|index| Arc::new(PartitionLog::new(name, index as i32)))
            .collect();
        Self {
            name: name.to_string(),
            partitions,
            round_robin: AtomicUsize::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn partition_count(&self) -> i32 {
        self.partitions.len() as i32
    }

    pub(crate) fn partition(&self, index: i32) -> Option<&Arc<PartitionLog>> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.partitions.get(index))
    }

    pub(crate) fn partitions(&self) -> &[Arc<PartitionLog>] {
        &self.partitions
    }

    /// Keyed records always land on the same partition; keyless records are
    /// spread round-robin.
    pub(crate) fn append(&self, record: OutboundRecord) -> (i32, i64) {
        let index = self.pick(record.key.as_deref());
        let partition = &self.partitions[index];
        (partition.index(), partition.append(record))
    }

    pub(crate) fn records(&self) -> Vec<Record> {
        self.partitions.iter().flat_map(|p| p.records()).collect()
    }

    fn pick(&self, key: Option<&[u8]>) -> usize {
        let count = self.partitions.len();
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % count as u64) as usize
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % count,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PartitionLog {
    topic: String,
    index: i32,
    records: RwLock<Vec<Record>>,
    high_watermark: watch::Sender<i64>,
}

impl PartitionLog {
    fn new(topic: &str, index: i32) -> Self {
        let (high_watermark, _) = watch::channel(0);
        Self {
            topic: topic.to_string(),
            index,
            records: RwLock::new(Vec::new()),
            high_watermark,
        }
    }

    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn index(&self) -> i32 {
        self.index
    }

    pub(crate) fn append(&self, record: OutboundRecord) -> i64 {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let offset = records.len() as i64;
        records.push(Record {
            topic: self.topic.clone(),
            partition: self.index,
            offset,
            key: record.key,
            value: record.value,
            headers: record.headers,
            timestamp: record.timestamp.unwrap_or_else(Utc::now),
        });
        // published under the write lock so the watermark never moves backwards
        self.high_watermark.send_replace(offset + 1);
        offset
    }

    pub(crate) fn get(&self, offset: i64) -> Option<Record> {
        let index = usize::try_from(offset).ok()?;
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    pub(crate) fn records(&self) -> Vec<Record> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn high_watermark(&self) -> i64 {
        *self.high_watermark.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<i64> {
        self.high_watermark.subscribe()
    }

    pub(crate) fn resolve(&self, offset: Offset) -> i64 {
        match offset {
            Offset::Oldest => 0,
            Offset::Newest => self.high_watermark(),
        }
    }
}

/// Waits until the partition holds a record at `offset`. Returns `false` if
/// the log went away.
pub(crate) async fn wait_past(high_watermark: &mut watch::Receiver<i64>, offset: i64) -> bool {
    loop {
        if *high_watermark.borrow_and_update() > offset {
            return true;
        }
        if high_watermark.changed().await.is_err() {
            return false;
        }
    }
}
