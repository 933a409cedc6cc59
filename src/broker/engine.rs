use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::BrokerConfig;
use super::consumer::ConsumeLoop;
use super::topic::Subscription;
use crate::client::{
    ClientState, Lifecycle, MessageHandler, MessagingClient, Publisher, Subscriber,
};
use crate::message::Message;
use crate::transport::{
    ConnectOptions, Connection, Offset, OutboundRecord, ReaderOptions, TopicWriter, TransportError,
};
use crate::utils::{MessagingError, Result, ShutdownTrigger};

/// Client backed by a broker connection.
///
/// Holds one writer and one reader per topic, created on first use and
/// reused afterwards. Every subscription runs its own consume loop; all loops
/// share the client lifetime signal and stop when the client is closed.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use messaging::broker::{BrokerClient, BrokerConfig};
/// use messaging::message::Message;
/// use messaging::transport::MemoryBroker;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = BrokerConfig::new(vec!["localhost:9092".to_string()]);
/// let client = BrokerClient::new(Arc::new(MemoryBroker::new()), config).unwrap();
/// client.publish("orders", Message::new("order.created")).await.unwrap();
/// client.close().await.unwrap();
/// # }
/// ```
pub struct BrokerClient {
    connection: Arc<dyn Connection>,
    config: BrokerConfig,
    options: ConnectOptions,
    writers: RwLock<HashMap<String, Arc<dyn TopicWriter>>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    /// Loops of unsubscribed topics still winding down.
    retired: Mutex<Vec<JoinHandle<()>>>,
    lifetime: ShutdownTrigger,
    lifecycle: Lifecycle,
}

impl BrokerClient {
    /// Builds a client. Fails with [`MessagingError::NoBrokers`] when the
    /// config names no broker.
    pub fn new(connection: Arc<dyn Connection>, config: BrokerConfig) -> Result<Self> {
        let config = config.with_defaults();
        if !config.has_brokers() {
            return Err(MessagingError::NoBrokers);
        }
        info!(
            client_id = %config.client_id,
            group_id = %config.group_id,
            brokers = ?config.brokers,
            "broker client created"
        );
        Ok(Self {
            connection,
            options: config.connect_options(),
            config,
            writers: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            lifetime: ShutdownTrigger::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }

    /// Topics with an active subscription, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    /// Checks that the broker is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.connection.ping(&self.options).await?;
        Ok(())
    }

    /// Loops of unsubscribed topics that have not exited yet.
    #[cfg(test)]
    pub(crate) fn retired_loops(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let message = message.stamp();
        let writer = self.writer(topic)?;

        let mut record = OutboundRecord::new(topic, message.encode()?)
            .with_key(message.id.as_bytes())
            .with_header("type", message.message_type.as_bytes());
        if let Some(created_at) = message.created_at {
            record = record.with_timestamp(created_at);
        }

        match tokio::time::timeout(
            self.config.publish_timeout,
            self.write_with_retry(writer.as_ref(), record),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(
                    topic,
                    message_id = %message.id,
                    message_type = %message.message_type,
                    "message published"
                );
                Ok(())
            }
            Ok(Err(error)) => {
                error!(topic, message_id = %message.id, %error, "publish failed");
                Err(error.into())
            }
            Err(_) => {
                warn!(topic, message_id = %message.id, "publish timed out");
                Err(MessagingError::PublishTimeout {
                    topic: topic.to_string(),
                })
            }
        }
    }

    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        if self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic)
        {
            return Err(MessagingError::AlreadySubscribed(topic.to_string()));
        }

        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscriptions.contains_key(topic) {
            return Err(MessagingError::AlreadySubscribed(topic.to_string()));
        }
        if self.lifecycle.state() >= ClientState::Closing {
            return Err(MessagingError::Closed);
        }

        let reader = self
            .connection
            .reader(
                &self.options,
                ReaderOptions {
                    topic: topic.to_string(),
                    group_id: Some(self.config.group_id.clone()),
                    start_offset: Offset::Oldest,
                },
            )
            .map_err(|source| MessagingError::Construction {
                resource: "reader",
                source,
            })?;

        let stop = ShutdownTrigger::new();
        let consume = ConsumeLoop {
            topic: topic.to_string(),
            reader: Arc::clone(&reader),
            handler,
            shutdown: self.lifetime.subscribe().or(&stop.subscribe()),
            handler_timeout: self.config.subscribe_timeout,
            retry_interval: self.config.retry_interval,
        };
        let span = info_span!("subscription", client_id = %self.config.client_id, topic);
        let task = tokio::spawn(consume.run().instrument(span));
        subscriptions.insert(topic.to_string(), Subscription { reader, stop, task });

        info!(topic, group_id = %self.config.group_id, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let subscription = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .ok_or_else(|| MessagingError::TopicNotFound(topic.to_string()))?;

        subscription.stop.trigger();
        if let Err(error) = subscription.reader.close().await {
            warn!(topic, %error, "failed to close reader");
        }
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.retain(|task| !task.is_finished());
        retired.push(subscription.task);
        drop(retired);

        info!(topic, "unsubscribed");
        Ok(())
    }

    /// Stops every loop, closes all writers and readers and waits for the
    /// loops to exit.
    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.lifetime.trigger();

        let writers: Vec<(String, Arc<dyn TopicWriter>)> = self
            .writers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        let subscriptions: Vec<(String, Subscription)> = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        let mut tasks: Vec<JoinHandle<()>> = self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for (topic, writer) in writers {
            if let Err(error) = writer.close().await {
                warn!(topic, %error, "failed to close writer");
            }
        }
        for (topic, subscription) in subscriptions {
            subscription.stop.trigger();
            if let Err(error) = subscription.reader.close().await {
                warn!(topic, %error, "failed to close reader");
            }
            tasks.push(subscription.task);
        }
        for task in tasks {
            if let Err(error) = task.await {
                error!(%error, "consume loop did not exit cleanly");
            }
        }

        self.lifecycle.finish_close();
        info!(client_id = %self.config.client_id, "broker client closed");
        Ok(())
    }

    fn writer(&self, topic: &str) -> Result<Arc<dyn TopicWriter>> {
        if let Some(writer) = self
            .writers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return Ok(Arc::clone(writer));
        }

        let mut writers = self
            .writers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = writers.get(topic) {
            return Ok(Arc::clone(writer));
        }
        if self.lifecycle.state() >= ClientState::Closing {
            return Err(MessagingError::Closed);
        }

        let writer = self
            .connection
            .writer(&self.options, topic)
            .map_err(|source| MessagingError::Construction {
                resource: "writer",
                source,
            })?;
        writers.insert(topic.to_string(), Arc::clone(&writer));
        debug!(topic, "writer created");
        Ok(writer)
    }

    async fn write_with_retry(
        &self,
        writer: &dyn TopicWriter,
        record: OutboundRecord,
    ) -> std::result::Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            match writer.write(record.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retriable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(topic = %record.topic, attempt, %error, "write failed, retrying");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl Publisher for BrokerClient {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        BrokerClient::publish(self, topic, message).await
    }
}

#[async_trait]
impl Subscriber for BrokerClient {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        BrokerClient::subscribe(self, topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        BrokerClient::unsubscribe(self, topic).await
    }
}

#[async_trait]
impl MessagingClient for BrokerClient {
    async fn close(&self) -> Result<()> {
        BrokerClient::close(self).await
    }

    fn state(&self) -> ClientState {
        BrokerClient::state(self)
    }
}
