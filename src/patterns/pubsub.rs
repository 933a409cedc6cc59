use std::sync::Arc;

use async_trait::async_trait;

use super::Pattern;
use super::config::PubSubConfig;
use super::partition::PartitionChannel;
use crate::client::{ClientState, PatternClient, PayloadHandler};
use crate::transport::{Connection, Offset};
use crate::utils::Result;

/// Fan-out client. Every subscriber sees each message published after it
/// subscribed; nothing published earlier is replayed.
pub struct PubSubClient {
    channel: PartitionChannel,
}

impl PubSubClient {
    pub async fn new(connection: &dyn Connection, config: PubSubConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let channel = PartitionChannel::open(Pattern::PubSub, connection, &options).await?;
        Ok(Self { channel })
    }

    /// Sends `payload` and waits for the broker to acknowledge it.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.channel.send(topic, payload).await
    }

    /// Consumes new messages of `topic` on a background task.
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.channel.listen(topic, Offset::Newest, handler).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.channel.stop(topic)
    }

    pub async fn close(&self) -> Result<()> {
        self.channel.close().await
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.channel.is_listening(topic)
    }

    pub fn state(&self) -> ClientState {
        self.channel.state()
    }
}

#[async_trait]
impl PatternClient for PubSubClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        PubSubClient::publish(self, topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        PubSubClient::subscribe(self, topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        PubSubClient::unsubscribe(self, topic).await
    }

    async fn close(&self) -> Result<()> {
        PubSubClient::close(self).await
    }

    fn pattern(&self) -> Pattern {
        Pattern::PubSub
    }
}
