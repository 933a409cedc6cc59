use std::sync::Arc;

use async_trait::async_trait;

use super::Pattern;
use super::config::QueueConfig;
use super::partition::PartitionChannel;
use crate::client::{ClientState, PatternClient, PayloadHandler};
use crate::transport::{Connection, Offset};
use crate::utils::Result;

/// Work-queue client. A consumer starts from the oldest message still held
/// by the queue, so work enqueued before anyone listened is not lost.
pub struct QueueClient {
    channel: PartitionChannel,
}

impl QueueClient {
    pub async fn new(connection: &dyn Connection, config: QueueConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let channel = PartitionChannel::open(Pattern::Queue, connection, &options).await?;
        Ok(Self { channel })
    }

    pub async fn enqueue(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        self.channel.send(queue, payload).await
    }

    pub async fn dequeue(&self, queue: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.channel.listen(queue, Offset::Oldest, handler).await
    }

    pub async fn unsubscribe(&self, queue: &str) -> Result<()> {
        self.channel.stop(queue)
    }

    pub async fn close(&self) -> Result<()> {
        self.channel.close().await
    }

    pub fn state(&self) -> ClientState {
        self.channel.state()
    }
}

#[async_trait]
impl PatternClient for QueueClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.enqueue(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.dequeue(topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        QueueClient::unsubscribe(self, topic).await
    }

    async fn close(&self) -> Result<()> {
        QueueClient::close(self).await
    }

    fn pattern(&self) -> Pattern {
        Pattern::Queue
    }
}
