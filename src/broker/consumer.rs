use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::client::MessageHandler;
use crate::message::Message;
use crate::transport::TopicReader;
use crate::utils::Shutdown;

/// Background loop feeding one topic's records to its handler.
pub(crate) struct ConsumeLoop {
    pub(crate) topic: String,
    pub(crate) reader: Arc<dyn TopicReader>,
    pub(crate) handler: Arc<dyn MessageHandler>,
    pub(crate) shutdown: Shutdown,
    pub(crate) handler_timeout: Duration,
    pub(crate) retry_interval: Duration,
}

impl ConsumeLoop {
    pub(crate) async fn run(self) {
        debug!(topic = %self.topic, "consume loop started");

        while !self.shutdown.is_triggered() {
            let read = tokio::select! {
                _ = self.shutdown.triggered() => break,
                read = self.reader.read() => read,
            };

            let record = match read {
                Ok(record) => record,
                Err(error) => {
                    if self.shutdown.is_triggered() {
                        break;
                    }
                    warn!(topic = %self.topic, %error, "failed to read record, retrying");
                    tokio::select! {
                        _ = self.shutdown.triggered() => break,
                        _ = tokio::time::sleep(self.retry_interval) => continue,
                    }
                }
            };

            let message = match Message::decode(&record.value) {
                Ok(message) => message,
                Err(error) => {
                    warn!(
                        topic = %self.topic,
                        partition = record.partition,
                        offset = record.offset,
                        %error,
                        "skipping undecodable record"
                    );
                    continue;
                }
            };

            self.dispatch(message).await;
        }

        debug!(topic = %self.topic, "consume loop stopped");
    }

    async fn dispatch(&self, message: Message) {
        let message_id = message.id.clone();
        match tokio::time::timeout(self.handler_timeout, self.handler.handle(message)).await {
            Ok(Ok(())) => {
                debug!(topic = %self.topic, %message_id, "message handled");
            }
            Ok(Err(error)) => {
                error!(topic = %self.topic, %message_id, %error, "handler failed");
            }
            Err(_) => {
                error!(
                    topic = %self.topic,
                    %message_id,
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "handler timed out"
                );
            }
        }
    }
}
