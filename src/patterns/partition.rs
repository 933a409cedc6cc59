//! Plumbing shared by the clients that read a single partition directly.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::Pattern;
use super::workers::Workers;
use crate::client::{ClientState, Lifecycle, PayloadHandler};
use crate::transport::{
    ConnectOptions, Connection, Consumer, Offset, OutboundRecord, PartitionConsumer, SyncProducer,
};
use crate::utils::{MessagingError, Result, Shutdown};

/// Partition every directly consumed topic is read from.
pub(crate) const CONSUMED_PARTITION: i32 = 0;

/// Opens a synchronous producer, then a consumer. The producer is closed
/// again if the consumer cannot be created.
pub(crate) async fn open_producer_and_consumer(
    connection: &dyn Connection,
    options: &ConnectOptions,
) -> Result<(Box<dyn SyncProducer>, Box<dyn Consumer>)> {
    let producer = connection
        .sync_producer(options)
        .map_err(|source| MessagingError::Construction {
            resource: "producer",
            source,
        })?;

    match connection.consumer(options) {
        Ok(consumer) => Ok((producer, consumer)),
        Err(source) => {
            if let Err(error) = producer.close().await {
                warn!(%error, "failed to close producer");
            }
            Err(MessagingError::Construction {
                resource: "consumer",
                source,
            })
        }
    }
}

/// Hands every record of one partition to `handler` until `shutdown` fires
/// or the consumer ends.
pub(crate) async fn consume_partition(
    pattern: Pattern,
    topic: String,
    mut partition: Box<dyn PartitionConsumer>,
    handler: Arc<dyn PayloadHandler>,
    shutdown: Shutdown,
) {
    debug!(%pattern, %topic, "partition loop started");
    loop {
        let next = tokio::select! {
            _ = shutdown.triggered() => break,
            next = partition.recv() => next,
        };
        match next {
            Some(Ok(record)) => {
                let offset = record.offset;
                if let Err(error) = handler.handle(record.value).await {
                    error!(%pattern, %topic, offset, %error, "handler failed");
                }
            }
            Some(Err(error)) => {
                warn!(%pattern, %topic, %error, "consumer error");
            }
            None => break,
        }
    }
    if let Err(error) = partition.close().await {
        warn!(%pattern, %topic, %error, "failed to close partition consumer");
    }
    debug!(%pattern, %topic, "partition loop stopped");
}

/// A producer plus partition consumer pair with per-topic loops.
pub(crate) struct PartitionChannel {
    pattern: Pattern,
    producer: Box<dyn SyncProducer>,
    consumer: Box<dyn Consumer>,
    workers: Workers,
    lifecycle: Lifecycle,
}

impl PartitionChannel {
    pub(crate) async fn open(
        pattern: Pattern,
        connection: &dyn Connection,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let (producer, consumer) = open_producer_and_consumer(connection, options).await?;
        info!(%pattern, client_id = %options.client_id, "pattern client created");
        Ok(Self {
            pattern,
            producer,
            consumer,
            workers: Workers::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    pub(crate) async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let (partition, offset) = self
            .producer
            .send(OutboundRecord::new(topic, payload))
            .await?;
        debug!(pattern = %self.pattern, topic, partition, offset, "payload sent");
        Ok(())
    }

    pub(crate) async fn listen(
        &self,
        topic: &str,
        offset: Offset,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<()> {
        self.lifecycle.ensure_running()?;
        start_partition_loop(
            self.pattern,
            &self.workers,
            self.consumer.as_ref(),
            topic,
            offset,
            handler,
        )
        .await
    }

    pub(crate) fn stop(&self, topic: &str) -> Result<()> {
        self.workers.stop(topic)?;
        info!(pattern = %self.pattern, topic, "unsubscribed");
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.workers.shutdown().await;
        if let Err(error) = self.producer.close().await {
            warn!(pattern = %self.pattern, %error, "failed to close producer");
        }
        if let Err(error) = self.consumer.close().await {
            warn!(pattern = %self.pattern, %error, "failed to close consumer");
        }
        self.lifecycle.finish_close();
        info!(pattern = %self.pattern, "pattern client closed");
        Ok(())
    }

    pub(crate) fn state(&self) -> ClientState {
        self.lifecycle.state()
    }

    pub(crate) fn is_listening(&self, topic: &str) -> bool {
        self.workers.is_running(topic)
    }
}

/// Opens a partition consumer for `topic` and runs it on a worker.
pub(crate) async fn start_partition_loop(
    pattern: Pattern,
    workers: &Workers,
    consumer: &dyn Consumer,
    topic: &str,
    offset: Offset,
    handler: Arc<dyn PayloadHandler>,
) -> Result<()> {
    if workers.is_running(topic) {
        return Err(MessagingError::AlreadySubscribed(topic.to_string()));
    }
    let partition = consumer.consume_partition(topic, CONSUMED_PARTITION, offset)?;
    let owned_topic = topic.to_string();

    // a concurrent subscribe may win the worker slot; ours is closed then
    let mut slot = Some(partition);
    let started = workers.start(topic, |shutdown| {
        let partition = slot.take();
        async move {
            if let Some(partition) = partition {
                consume_partition(pattern, owned_topic, partition, handler, shutdown).await;
            }
        }
    });
    if let Err(error) = started {
        if let Some(mut partition) = slot.take() {
            if let Err(close_error) = partition.close().await {
                warn!(
                    %pattern,
                    topic,
                    error = %close_error,
                    "failed to close partition consumer"
                );
            }
        }
        return Err(error);
    }
    info!(%pattern, topic, ?offset, "subscribed");
    Ok(())
}
