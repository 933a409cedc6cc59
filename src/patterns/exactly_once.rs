use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::Pattern;
use super::config::ExactlyOnceConfig;
use super::partition::start_partition_loop;
use super::workers::Workers;
use crate::client::{ClientState, Lifecycle, PatternClient, PayloadHandler};
use crate::transport::{Connection, Consumer, Offset, OutboundRecord, TransactionalProducer};
use crate::utils::{MessagingError, Result, TxnStage};

/// Client writing every message inside its own producer transaction.
///
/// A message is either committed or discarded as a whole. Reading is
/// at-least-once: receivers consume committed messages from the newest
/// offset and a failing handler is only logged.
pub struct ExactlyOnceClient {
    producer: Box<dyn TransactionalProducer>,
    consumer: Box<dyn Consumer>,
    transactional_id: String,
    /// A producer runs one transaction at a time.
    transaction: Mutex<()>,
    workers: Workers,
    lifecycle: Lifecycle,
}

impl ExactlyOnceClient {
    pub async fn new(connection: &dyn Connection, config: ExactlyOnceConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let transactional_id = config.transactional_id(&options);

        let producer = connection
            .transactional_producer(&options, &transactional_id)
            .map_err(|source| MessagingError::Construction {
                resource: "transactional producer",
                source,
            })?;
        let consumer = match connection.consumer(&options) {
            Ok(consumer) => consumer,
            Err(source) => {
                if let Err(error) = producer.close().await {
                    warn!(%transactional_id, %error, "failed to close producer");
                }
                return Err(MessagingError::Construction {
                    resource: "consumer",
                    source,
                });
            }
        };

        info!(%transactional_id, client_id = %options.client_id, "exactly-once client created");
        Ok(Self {
            producer,
            consumer,
            transactional_id,
            transaction: Mutex::new(()),
            workers: Workers::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn transactional_id(&self) -> &str {
        &self.transactional_id
    }

    /// Writes `payload` in a transaction of its own. A failed send or commit
    /// aborts the transaction and returns the failure.
    pub async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let _transaction = self.transaction.lock().await;

        self.producer
            .begin()
            .await
            .map_err(|source| MessagingError::Transaction {
                stage: TxnStage::Begin,
                source,
            })?;

        if let Err(source) = self.producer.send(OutboundRecord::new(topic, payload)).await {
            self.abort(topic).await;
            return Err(MessagingError::Transaction {
                stage: TxnStage::Send,
                source,
            });
        }

        if let Err(source) = self.producer.commit().await {
            self.abort(topic).await;
            return Err(MessagingError::Transaction {
                stage: TxnStage::Commit,
                source,
            });
        }

        debug!(transactional_id = %self.transactional_id, topic, "transaction committed");
        Ok(())
    }

    pub async fn receive(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        start_partition_loop(
            Pattern::ExactlyOnce,
            &self.workers,
            self.consumer.as_ref(),
            topic,
            Offset::Newest,
            handler,
        )
        .await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.workers.stop(topic)?;
        info!(transactional_id = %self.transactional_id, topic, "unsubscribed");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.workers.shutdown().await;
        if let Err(error) = self.producer.close().await {
            warn!(transactional_id = %self.transactional_id, %error, "failed to close producer");
        }
        if let Err(error) = self.consumer.close().await {
            warn!(transactional_id = %self.transactional_id, %error, "failed to close consumer");
        }
        self.lifecycle.finish_close();
        info!(transactional_id = %self.transactional_id, "exactly-once client closed");
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }

    async fn abort(&self, topic: &str) {
        match self.producer.abort().await {
            Ok(()) => warn!(transactional_id = %self.transactional_id, topic, "transaction aborted"),
            Err(error) => error!(
                transactional_id = %self.transactional_id,
                topic,
                %error,
                "failed to abort transaction"
            ),
        }
    }
}

#[async_trait]
impl PatternClient for ExactlyOnceClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.send(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()> {
        self.receive(topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        ExactlyOnceClient::unsubscribe(self, topic).await
    }

    async fn close(&self) -> Result<()> {
        ExactlyOnceClient::close(self).await
    }

    fn pattern(&self) -> Pattern {
        Pattern::ExactlyOnce
    }
}
