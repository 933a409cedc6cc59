use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::Pattern;
use super::config::{ConsumerGroupConfig, Semantics};
use super::workers::Workers;
use crate::client::{ClientState, Lifecycle, PatternClient, PayloadHandler};
use crate::transport::{
    Claim, ClaimHandler, Connection, ConsumerGroup, GroupOptions, GroupSession, OutboundRecord,
    Record, SyncProducer, TransportError,
};
use crate::utils::{MessagingError, Result, Shutdown};

/// Client whose consumers share the partitions of their topics with every
/// other member of the same group.
///
/// When offsets are committed depends on [`Semantics`]. By default a record
/// is committed after its handler ran whether or not it succeeded, so a
/// failing message is never redelivered to the group.
///
/// Each subscription joins the group `concurrency` times; every member runs
/// its own session loop and leaves the group when the subscription stops.
pub struct ConsumerGroupClient {
    producer: Box<dyn SyncProducer>,
    members: Vec<Arc<dyn ConsumerGroup>>,
    group_id: String,
    semantics: Semantics,
    backoff: Duration,
    workers: Workers,
    lifecycle: Lifecycle,
}

impl ConsumerGroupClient {
    pub async fn new(connection: &dyn Connection, config: ConsumerGroupConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let group_id = config.group_id().to_string();

        let producer = connection
            .sync_producer(&options)
            .map_err(|source| MessagingError::Construction {
                resource: "producer",
                source,
            })?;

        let mut members: Vec<Arc<dyn ConsumerGroup>> = Vec::with_capacity(config.concurrency());
        for _ in 0..config.concurrency() {
            let group = connection.consumer_group(
                &options,
                GroupOptions {
                    group_id: group_id.clone(),
                    initial_offset: config.initial_offset,
                },
            );
            match group {
                Ok(group) => members.push(Arc::from(group)),
                Err(source) => {
                    close_members(&members, &group_id).await;
                    if let Err(error) = producer.close().await {
                        warn!(%group_id, %error, "failed to close producer");
                    }
                    return Err(MessagingError::Construction {
                        resource: "consumer group",
                        source,
                    });
                }
            }
        }

        info!(
            %group_id,
            client_id = %options.client_id,
            semantics = ?config.semantics,
            concurrency = members.len(),
            "consumer group client created"
        );
        Ok(Self {
            producer,
            members,
            group_id,
            semantics: config.semantics,
            backoff: config.backoff(),
            workers: Workers::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let (partition, offset) = self
            .producer
            .send(OutboundRecord::new(topic, payload))
            .await?;
        debug!(group_id = %self.group_id, topic, partition, offset, "payload sent");
        Ok(())
    }

    /// Consumes `topics` on the caller's task, rejoining the group after
    /// every rebalance. Returns `Ok` once the client is closed.
    pub async fn consume(&self, topics: &[String], handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.group_loops(topics.to_vec(), handler)
            .run(self.workers.lifetime())
            .await
    }

    /// Runs [`Self::consume`] for `topic` on a background task.
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let loops = self.group_loops(vec![topic.to_string()], handler);
        self.workers.start(topic, move |shutdown| async move {
            let group_id = loops.group_id.clone();
            let topics = loops.topics.clone();
            if let Err(error) = loops.run(shutdown).await {
                error!(%group_id, ?topics, %error, "consumer group loop failed");
            }
        })?;
        info!(group_id = %self.group_id, topic, "subscribed");
        Ok(())
    }

    /// Stops the loops of `topic`; its members leave the group once their
    /// current session ends, handing their partitions to the others.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.workers.stop(topic)?;
        info!(group_id = %self.group_id, topic, "unsubscribed");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.workers.shutdown().await;
        close_members(&self.members, &self.group_id).await;
        if let Err(error) = self.producer.close().await {
            warn!(group_id = %self.group_id, %error, "failed to close producer");
        }
        self.lifecycle.finish_close();
        info!(group_id = %self.group_id, "consumer group client closed");
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }

    fn group_loops(&self, topics: Vec<String>, handler: Arc<dyn PayloadHandler>) -> GroupLoops {
        GroupLoops {
            members: self.members.clone(),
            topics,
            handler,
            group_id: self.group_id.clone(),
            semantics: self.semantics,
            backoff: self.backoff,
        }
    }
}

async fn close_members(members: &[Arc<dyn ConsumerGroup>], group_id: &str) {
    for member in members {
        if let Err(error) = member.close().await {
            warn!(%group_id, %error, "failed to close consumer group");
        }
    }
}

/// One session loop per group member, all consuming the same topics.
struct GroupLoops {
    members: Vec<Arc<dyn ConsumerGroup>>,
    topics: Vec<String>,
    handler: Arc<dyn PayloadHandler>,
    group_id: String,
    semantics: Semantics,
    backoff: Duration,
}

impl GroupLoops {
    /// Returns the first loop error once every loop has exited.
    async fn run(self, shutdown: Shutdown) -> Result<()> {
        let loops = self.members.iter().map(|member| {
            let claims = GroupHandler {
                handler: Arc::clone(&self.handler),
                group_id: self.group_id.clone(),
                semantics: self.semantics,
                backoff: self.backoff,
                shutdown: shutdown.clone(),
            };
            run_group(member.as_ref(), &self.topics, claims, shutdown.clone())
        });
        join_all(loops).await.into_iter().collect()
    }
}

async fn run_group(
    group: &dyn ConsumerGroup,
    topics: &[String],
    claims: GroupHandler,
    shutdown: Shutdown,
) -> Result<()> {
    let mut result = Ok(());
    while !shutdown.is_triggered() {
        match group.consume(topics, &claims, shutdown.clone()).await {
            Ok(()) => {}
            Err(TransportError::Closed) if shutdown.is_triggered() => break,
            Err(error) => {
                result = Err(error.into());
                break;
            }
        }
    }
    if let Err(error) = group.leave(topics).await {
        warn!(group_id = %claims.group_id, ?topics, %error, "failed to leave consumer group");
    }
    result
}

struct GroupHandler {
    handler: Arc<dyn PayloadHandler>,
    group_id: String,
    semantics: Semantics,
    backoff: Duration,
    shutdown: Shutdown,
}

impl GroupHandler {
    async fn handle_logged(&self, record: &Record) {
        if let Err(error) = self.handler.handle(record.value.clone()).await {
            error!(
                group_id = %self.group_id,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                %error,
                "handler failed"
            );
        }
    }

    /// Retries the handler until it succeeds. Returns `false` if the
    /// consumer stopped first.
    async fn handle_until_ok(&self, record: &Record) -> bool {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let Err(error) = self.handler.handle(record.value.clone()).await else {
                return true;
            };
            warn!(
                group_id = %self.group_id,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempt,
                %error,
                "handler failed, retrying"
            );
            tokio::select! {
                _ = self.shutdown.triggered() => return false,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }
}

#[async_trait]
impl ClaimHandler for GroupHandler {
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), TransportError> {
        debug!(
            group_id = %self.group_id,
            member_id = session.member_id(),
            generation = session.generation(),
            "group session started"
        );
        Ok(())
    }

    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), TransportError> {
        debug!(
            group_id = %self.group_id,
            member_id = session.member_id(),
            generation = session.generation(),
            "group session ended"
        );
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: &mut Claim,
    ) -> Result<(), TransportError> {
        while let Some(record) = claim.recv().await {
            // records still buffered when the consumer stops stay unmarked
            if self.shutdown.is_triggered() {
                break;
            }
            match self.semantics {
                Semantics::BestEffort => {
                    self.handle_logged(&record).await;
                    session.mark_message(&record);
                }
                Semantics::AtMostOnce => {
                    session.mark_message(&record);
                    self.handle_logged(&record).await;
                }
                Semantics::AtLeastOnce => {
                    if !self.handle_until_ok(&record).await {
                        break;
                    }
                    session.mark_message(&record);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PatternClient for ConsumerGroupClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        ConsumerGroupClient::publish(self, topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        ConsumerGroupClient::subscribe(self, topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        ConsumerGroupClient::unsubscribe(self, topic).await
    }

    async fn close(&self) -> Result<()> {
        ConsumerGroupClient::close(self).await
    }

    fn pattern(&self) -> Pattern {
        Pattern::ConsumerGroup
    }
}
