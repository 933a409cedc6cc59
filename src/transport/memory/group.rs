//! Consumer-group coordination for the in-memory broker.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::MemoryBroker;
use super::log::{PartitionLog, TopicLog, wait_past};
use crate::transport::error::TransportError;
use crate::transport::record::{Offset, Record};
use crate::transport::traits::{Claim, ClaimHandler, ConsumerGroup, GroupSession};
use crate::utils::{Shutdown, ShutdownTrigger};

const CLAIM_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Committed positions and membership of one group id.
///
/// Group-scoped topic readers use the same positions, which is what makes
/// readers sharing a group id compete for records.
#[derive(Debug)]
pub(crate) struct GroupCoordinator {
    committed: Mutex<HashMap<(String, i32), i64>>,
    members: Mutex<BTreeMap<String, Vec<String>>>,
    generation: watch::Sender<u64>,
}

impl GroupCoordinator {
    pub(crate) fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            committed: Mutex::new(HashMap::new()),
            members: Mutex::new(BTreeMap::new()),
            generation,
        }
    }

    pub(crate) fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        lock(&self.committed)
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Committed positions only move forward.
    pub(crate) fn commit(&self, topic: &str, partition: i32, next_offset: i64) {
        lock(&self.committed)
            .entry((topic.to_string(), partition))
            .and_modify(|offset| *offset = (*offset).max(next_offset))
            .or_insert(next_offset);
    }

    /// Returns the committed position, committing `start()` first if the group
    /// has never seen this partition.
    pub(crate) fn position_or(
        &self,
        topic: &str,
        partition: i32,
        start: impl FnOnce() -> i64,
    ) -> i64 {
        *lock(&self.committed)
            .entry((topic.to_string(), partition))
            .or_insert_with(start)
    }

    /// Takes the record at the group's position and advances past it.
    pub(crate) fn claim_next(&self, log: &PartitionLog) -> Option<Record> {
        let mut committed = lock(&self.committed);
        let key = (log.topic().to_string(), log.index());
        let next = committed.get(&key).copied().unwrap_or(0);
        let record = log.get(next)?;
        committed.insert(key, next + 1);
        Some(record)
    }

    /// Registers `member_id` for `topics`. The generation only moves when the
    /// membership actually changed.
    pub(crate) fn join(&self, member_id: &str, topics: &[String]) -> u64 {
        let mut members = lock(&self.members);
        let mut topics = topics.to_vec();
        topics.sort();
        topics.dedup();
        if members.get(member_id) != Some(&topics) {
            members.insert(member_id.to_string(), topics);
            self.generation.send_modify(|generation| *generation += 1);
        }
        *self.generation.borrow()
    }

    pub(crate) fn leave(&self, member_id: &str) {
        if lock(&self.members).remove(member_id).is_some() {
            self.generation.send_modify(|generation| *generation += 1);
        }
    }

    pub(crate) fn member_count(&self) -> usize {
        lock(&self.members).len()
    }

    pub(crate) fn watch_generation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Partitions owned by `member_id`: each topic's partitions are dealt
    /// round-robin over the members subscribed to it, in member id order.
    pub(crate) fn assignment(
        &self,
        member_id: &str,
        partition_count: impl Fn(&str) -> i32,
    ) -> Vec<(String, i32)> {
        let members = lock(&self.members);
        let Some(topics) = members.get(member_id) else {
            return Vec::new();
        };

        let mut assigned = Vec::new();
        for topic in topics {
            let subscribed: Vec<&str> = members
                .iter()
                .filter(|(_, member_topics)| member_topics.contains(topic))
                .map(|(id, _)| id.as_str())
                .collect();
            let Some(position) = subscribed.iter().position(|id| *id == member_id) else {
                continue;
            };
            for partition in 0..partition_count(topic) {
                if partition as usize % subscribed.len() == position {
                    assigned.push((topic.clone(), partition));
                }
            }
        }
        assigned
    }
}

struct MemorySession {
    coordinator: Arc<GroupCoordinator>,
    member_id: String,
    generation: u64,
}

impl GroupSession for MemorySession {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn mark_message(&self, record: &Record) {
        self.coordinator
            .commit(&record.topic, record.partition, record.offset + 1);
    }
}

/// One client's handle on a group.
///
/// Every distinct topic set passed to `consume` joins as its own member, so a
/// client may run sessions for several topics side by side.
pub(crate) struct MemoryConsumerGroup {
    broker: MemoryBroker,
    coordinator: Arc<GroupCoordinator>,
    member_id: String,
    initial_offset: Offset,
    joined: Mutex<BTreeSet<String>>,
    closed: ShutdownTrigger,
}

impl MemoryConsumerGroup {
    pub(crate) fn new(
        broker: MemoryBroker,
        coordinator: Arc<GroupCoordinator>,
        member_id: String,
        initial_offset: Offset,
    ) -> Self {
        Self {
            broker,
            coordinator,
            member_id,
            initial_offset,
            joined: Mutex::new(BTreeSet::new()),
            closed: ShutdownTrigger::new(),
        }
    }

    fn session_member(&self, topics: &[String]) -> String {
        let mut topics = topics.to_vec();
        topics.sort();
        topics.dedup();
        format!("{}/{}", self.member_id, topics.join(","))
    }
}

#[async_trait]
impl ConsumerGroup for MemoryConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: &dyn ClaimHandler,
        shutdown: Shutdown,
    ) -> Result<(), TransportError> {
        if self.closed.is_triggered() {
            return Err(TransportError::Closed);
        }

        let member_id = self.session_member(topics);
        lock(&self.joined).insert(member_id.clone());
        let logs: Vec<Arc<TopicLog>> = topics.iter().map(|t| self.broker.topic(t)).collect();
        let mut generation_rx = self.coordinator.watch_generation();
        let generation = self.coordinator.join(&member_id, topics);
        let assignment = self.coordinator.assignment(&member_id, |topic| {
            logs.iter()
                .find(|log| log.name() == topic)
                .map_or(0, |log| log.partition_count())
        });
        debug!(
            member_id = %member_id,
            generation,
            partitions = assignment.len(),
            "joined consumer group"
        );

        let session = MemorySession {
            coordinator: Arc::clone(&self.coordinator),
            member_id,
            generation,
        };
        handler.setup(&session).await?;

        let stop = shutdown.or(&self.closed.subscribe());
        let end = ShutdownTrigger::new();
        let mut claims = Vec::with_capacity(assignment.len());
        let mut feeders = Vec::with_capacity(assignment.len());
        for (topic, partition) in assignment {
            let Some(log) = logs
                .iter()
                .find(|log| log.name() == topic)
                .and_then(|log| log.partition(partition))
                .cloned()
            else {
                continue;
            };
            let start = self.coordinator.position_or(&topic, partition, || {
                log.resolve(self.initial_offset)
            });
            let (tx, rx) = mpsc::channel(CLAIM_BUFFER);
            claims.push(Claim::new(topic, partition, start, rx));
            feeders.push(feed_claim(log, start, tx, end.subscribe().or(&stop)));
        }

        let session_end = async {
            tokio::select! {
                _ = wait_for_rebalance(&mut generation_rx, generation) => {}
                _ = stop.triggered() => {}
            }
            end.trigger();
        };
        let session_ref = &session;
        let handlers = join_all(
            claims
                .iter_mut()
                .map(|claim| handler.consume_claim(session_ref, claim)),
        );
        let ((), _, results) = tokio::join!(session_end, join_all(feeders), handlers);

        handler.cleanup(&session).await?;
        results.into_iter().collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }

    async fn leave(&self, topics: &[String]) -> Result<(), TransportError> {
        let member_id = self.session_member(topics);
        if lock(&self.joined).remove(&member_id) {
            self.coordinator.leave(&member_id);
            debug!(member_id = %member_id, "left consumer group");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.trigger();
        let joined = std::mem::take(&mut *lock(&self.joined));
        for member_id in joined {
            self.coordinator.leave(&member_id);
        }
        Ok(())
    }
}

async fn wait_for_rebalance(generation_rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *generation_rx.borrow_and_update() != generation {
            return;
        }
        if generation_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Pushes records of one partition into a claim until the session ends.
///
/// `end` also carries the consumer's own stop signal, so a record appended
/// after the consumer was told to stop is left for the next owner.
async fn feed_claim(
    log: Arc<PartitionLog>,
    mut next: i64,
    tx: mpsc::Sender<Record>,
    end: Shutdown,
) {
    let mut high_watermark = log.watch();
    loop {
        let ready = tokio::select! {
            _ = end.triggered() => false,
            ready = wait_past(&mut high_watermark, next) => ready,
        };
        if !ready {
            return;
        }
        let Some(record) = log.get(next) else {
            return;
        };
        if end.is_triggered() {
            return;
        }
        tokio::select! {
            _ = end.triggered() => return,
            sent = tx.send(record) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        next += 1;
    }
}
