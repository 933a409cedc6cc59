use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;

/// Error type handlers may return. Errors are logged by the consuming loop
/// and never stop it.
pub type HandlerError = Box<dyn Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// Callback for structured clients.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> HandlerResult;
}

/// Callback for byte-oriented pattern clients.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn handle(&self, payload: Vec<u8>) -> HandlerResult;
}

struct FnMessageHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnMessageHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, message: Message) -> HandlerResult {
        (self.0)(message).await
    }
}

struct FnPayloadHandler<F>(F);

#[async_trait]
impl<F, Fut> PayloadHandler for FnPayloadHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, payload: Vec<u8>) -> HandlerResult {
        (self.0)(payload).await
    }
}

/// Wraps an async closure as a [`MessageHandler`].
///
/// ```rust
/// use messaging::client::message_handler;
///
/// let handler = message_handler(|msg| async move {
///     println!("got {}", msg.id);
///     Ok(())
/// });
/// # drop(handler);
/// ```
pub fn message_handler<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnMessageHandler(f))
}

/// Wraps an async closure as a [`PayloadHandler`].
pub fn payload_handler<F, Fut>(f: F) -> Arc<dyn PayloadHandler>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnPayloadHandler(f))
}
