use std::sync::Arc;

use async_trait::async_trait;

use super::handler::{MessageHandler, PayloadHandler};
use super::lifecycle::ClientState;
use crate::message::Message;
use crate::patterns::Pattern;
use crate::utils::Result;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `message` to `topic`, filling in its id and creation time
    /// when they are missing.
    async fn publish(&self, topic: &str, message: Message) -> Result<()>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;
    async fn unsubscribe(&self, topic: &str) -> Result<()>;
}

/// A structured client: local or broker backed.
#[async_trait]
pub trait MessagingClient: Publisher + Subscriber {
    /// Stops every consuming loop and releases resources. Calling it again is
    /// a no-op.
    async fn close(&self) -> Result<()>;

    fn state(&self) -> ClientState;
}

/// Byte-oriented client implementing one delivery pattern.
///
/// `subscribe` maps to the pattern's own consuming operation (`dequeue`,
/// `consume`, `receive`); each topic holds at most one subscription.
#[async_trait]
pub trait PatternClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<()>;
    async fn unsubscribe(&self, topic: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn pattern(&self) -> Pattern;
}
