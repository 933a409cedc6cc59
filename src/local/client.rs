use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::client::{
    ClientState, Lifecycle, MessageHandler, MessagingClient, Publisher, Subscriber,
};
use crate::message::Message;
use crate::utils::Result;

type HandlerMap = HashMap<String, Vec<Arc<dyn MessageHandler>>>;

/// Broadcasts messages to in-process handlers.
///
/// A topic may have any number of handlers. A failing handler is logged and
/// does not prevent the remaining handlers from running.
pub struct LocalClient {
    handlers: RwLock<HandlerMap>,
    lifecycle: Lifecycle,
}

impl LocalClient {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    pub async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        self.lifecycle.ensure_running()?;
        let message = message.stamp();

        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            warn!(topic, message_id = %message.id, "no handlers registered for topic");
            return Ok(());
        }

        for handler in handlers {
            if let Err(error) = handler.handle(message.clone()).await {
                error!(topic, message_id = %message.id, %error, "handler failed");
            }
        }

        debug!(
            topic,
            message_id = %message.id,
            message_type = %message.message_type,
            "message delivered locally"
        );
        Ok(())
    }

    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        info!(topic, "subscribed to local topic");
        Ok(())
    }

    /// Drops every handler of `topic`. Unknown topics are not an error.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let removed = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
        if removed.is_some() {
            info!(topic, "unsubscribed from local topic");
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.lifecycle.finish_close();
        info!("local client closed");
        Ok(())
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for LocalClient {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        LocalClient::publish(self, topic, message).await
    }
}

#[async_trait]
impl Subscriber for LocalClient {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        LocalClient::subscribe(self, topic, handler).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        LocalClient::unsubscribe(self, topic).await
    }
}

#[async_trait]
impl MessagingClient for LocalClient {
    async fn close(&self) -> Result<()> {
        LocalClient::close(self).await
    }

    fn state(&self) -> ClientState {
        LocalClient::state(self)
    }
}
