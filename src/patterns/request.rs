//! Request/reply over two topics.
//!
//! A request carries a correlation id and the topic its reply should go to
//! as record headers. Responders answer on that topic with the same
//! correlation id; the requester waits for the matching reply.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::RequestConfig;
use super::workers::Workers;
use crate::client::{ClientState, HandlerError, Lifecycle};
use crate::transport::{
    ConnectOptions, Connection, Offset, OutboundRecord, ReaderOptions, Record, SyncProducer,
    TopicReader, TransportError,
};
use crate::utils::{MessagingError, Result, Shutdown};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const REPLY_TO_HEADER: &str = "x-reply-to";

/// Callback answering one request payload with a reply payload.
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    async fn reply(&self, payload: Vec<u8>) -> std::result::Result<Vec<u8>, HandlerError>;
}

struct FnReplyHandler<F>(F);

#[async_trait]
impl<F, Fut> ReplyHandler for FnReplyHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Vec<u8>, HandlerError>> + Send,
{
    async fn reply(&self, payload: Vec<u8>) -> std::result::Result<Vec<u8>, HandlerError> {
        (self.0)(payload).await
    }
}

/// Wraps an async closure as a [`ReplyHandler`].
pub fn reply_handler<F, Fut>(f: F) -> Arc<dyn ReplyHandler>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Vec<u8>, HandlerError>> + Send + 'static,
{
    Arc::new(FnReplyHandler(f))
}

/// Header lookup ignoring ASCII case, as brokers and proxies may rewrite
/// header names.
fn header<'a>(record: &'a Record, key: &str) -> Option<&'a [u8]> {
    record
        .headers
        .iter()
        .find(|h| h.key.eq_ignore_ascii_case(key))
        .map(|h| h.value.as_slice())
}

/// Sends requests and waits for their replies, and serves requests with a
/// [`ReplyHandler`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use messaging::patterns::{RequestClient, RequestConfig, reply_handler};
/// use messaging::transport::MemoryBroker;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = RequestConfig::new(vec!["localhost:9092".to_string()]);
/// let client = RequestClient::new(Arc::new(MemoryBroker::new()), config).await.unwrap();
/// client
///     .serve("greet", reply_handler(|name| async move {
///         Ok([b"hello ".as_slice(), name.as_slice()].concat())
///     }))
///     .await
///     .unwrap();
///
/// let reply = client.request("greet", "greet.replies", b"ada".to_vec()).await.unwrap();
/// assert_eq!(reply.value, b"hello ada".to_vec());
/// client.close().await.unwrap();
/// # }
/// ```
pub struct RequestClient {
    connection: Arc<dyn Connection>,
    options: ConnectOptions,
    producer: Arc<dyn SyncProducer>,
    group_id: String,
    timeout: Duration,
    workers: Workers,
    lifecycle: Lifecycle,
}

impl RequestClient {
    pub async fn new(connection: Arc<dyn Connection>, config: RequestConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let producer = connection
            .sync_producer(&options)
            .map_err(|source| MessagingError::Construction {
                resource: "producer",
                source,
            })?;
        info!(
            client_id = %options.client_id,
            group_id = config.group_id(),
            "request client created"
        );
        Ok(Self {
            connection,
            producer: Arc::from(producer),
            group_id: config.group_id().to_string(),
            timeout: config.timeout(),
            options,
            workers: Workers::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Checks that the broker is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.lifecycle.ensure_running()?;
        self.connection.ping(&self.options).await?;
        Ok(())
    }

    /// [`Self::request_with_timeout`] with the configured timeout.
    pub async fn request(
        &self,
        request_topic: &str,
        reply_topic: &str,
        payload: Vec<u8>,
    ) -> Result<Record> {
        self.request_with_timeout(request_topic, reply_topic, payload, self.timeout)
            .await
    }

    /// Publishes `payload` to `request_topic` and waits up to `timeout` for
    /// the reply carrying the same correlation id on `reply_topic`.
    ///
    /// Replies to other requests are skipped. Fails with
    /// [`MessagingError::RequestTimeout`] when no reply arrives in time.
    pub async fn request_with_timeout(
        &self,
        request_topic: &str,
        reply_topic: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Record> {
        self.lifecycle.ensure_running()?;
        let correlation_id = Uuid::new_v4().simple().to_string();

        // attached before sending so a fast reply is not missed
        let replies = self
            .connection
            .reader(
                &self.options,
                ReaderOptions {
                    topic: reply_topic.to_string(),
                    group_id: None,
                    start_offset: Offset::Newest,
                },
            )
            .map_err(|source| MessagingError::Construction {
                resource: "reply reader",
                source,
            })?;

        let result = self
            .exchange(
                request_topic,
                reply_topic,
                payload,
                &correlation_id,
                replies.as_ref(),
                timeout,
            )
            .await;
        if let Err(error) = replies.close().await {
            warn!(reply_topic, %error, "failed to close reply reader");
        }
        result
    }

    async fn exchange(
        &self,
        request_topic: &str,
        reply_topic: &str,
        payload: Vec<u8>,
        correlation_id: &str,
        replies: &dyn TopicReader,
        timeout: Duration,
    ) -> Result<Record> {
        let record = OutboundRecord::new(request_topic, payload)
            .with_header(CORRELATION_ID_HEADER, correlation_id.as_bytes())
            .with_header(REPLY_TO_HEADER, reply_topic.as_bytes());
        let (partition, offset) = self.producer.send(record).await?;
        debug!(request_topic, partition, offset, correlation_id, "request sent");

        let closed = self.workers.lifetime();
        let wait = async {
            loop {
                let reply = replies.read().await?;
                if header(&reply, CORRELATION_ID_HEADER) == Some(correlation_id.as_bytes()) {
                    return Ok::<_, TransportError>(reply);
                }
            }
        };
        tokio::select! {
            _ = closed.triggered() => Err(MessagingError::Closed),
            reply = tokio::time::timeout(timeout, wait) => match reply {
                Ok(reply) => reply.map_err(MessagingError::from),
                Err(_) => {
                    warn!(reply_topic, correlation_id, ?timeout, "request timed out");
                    Err(MessagingError::RequestTimeout {
                        topic: reply_topic.to_string(),
                        correlation_id: correlation_id.to_string(),
                    })
                }
            },
        }
    }

    /// Answers requests arriving on `topic` with `handler` on a background
    /// task. Responders sharing the group id split the requests between
    /// them. A failing handler sends no reply.
    pub async fn serve(&self, topic: &str, handler: Arc<dyn ReplyHandler>) -> Result<()> {
        self.lifecycle.ensure_running()?;
        if self.workers.is_running(topic) {
            return Err(MessagingError::AlreadySubscribed(topic.to_string()));
        }
        let requests = self
            .connection
            .reader(
                &self.options,
                ReaderOptions {
                    topic: topic.to_string(),
                    group_id: Some(self.group_id.clone()),
                    start_offset: Offset::Oldest,
                },
            )
            .map_err(|source| MessagingError::Construction {
                resource: "reader",
                source,
            })?;

        let responder = Responder {
            topic: topic.to_string(),
            requests: Arc::clone(&requests),
            producer: Arc::clone(&self.producer),
            handler,
        };
        if let Err(error) = self
            .workers
            .start(topic, move |shutdown| responder.run(shutdown))
        {
            if let Err(close_error) = requests.close().await {
                warn!(topic, error = %close_error, "failed to close reader");
            }
            return Err(error);
        }
        info!(topic, group_id = %self.group_id, "serving requests");
        Ok(())
    }

    pub async fn stop_serving(&self, topic: &str) -> Result<()> {
        self.workers.stop(topic)?;
        info!(topic, "stopped serving requests");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.workers.shutdown().await;
        if let Err(error) = self.producer.close().await {
            warn!(%error, "failed to close producer");
        }
        self.lifecycle.finish_close();
        info!(client_id = %self.options.client_id, "request client closed");
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }
}

struct Responder {
    topic: String,
    requests: Arc<dyn TopicReader>,
    producer: Arc<dyn SyncProducer>,
    handler: Arc<dyn ReplyHandler>,
}

impl Responder {
    async fn run(self, shutdown: Shutdown) {
        loop {
            let read = tokio::select! {
                _ = shutdown.triggered() => break,
                read = self.requests.read() => read,
            };
            match read {
                Ok(request) => self.answer(request).await,
                Err(TransportError::Closed) => break,
                Err(error) => warn!(topic = %self.topic, %error, "failed to read request"),
            }
        }
        if let Err(error) = self.requests.close().await {
            warn!(topic = %self.topic, %error, "failed to close reader");
        }
        debug!(topic = %self.topic, "responder stopped");
    }

    async fn answer(&self, request: Record) {
        let Some(reply_to) = header(&request, REPLY_TO_HEADER)
            .map(|topic| String::from_utf8_lossy(topic).into_owned())
        else {
            warn!(topic = %self.topic, offset = request.offset, "request without reply topic");
            return;
        };
        let correlation_id = header(&request, CORRELATION_ID_HEADER)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let payload = match self.handler.reply(request.value).await {
            Ok(payload) => payload,
            Err(error) => {
                error!(
                    topic = %self.topic,
                    offset = request.offset,
                    %error,
                    "reply handler failed"
                );
                return;
            }
        };
        let reply = OutboundRecord::new(reply_to.clone(), payload)
            .with_header(CORRELATION_ID_HEADER, correlation_id);
        if let Err(error) = self.producer.send(reply).await {
            error!(topic = %self.topic, %reply_to, %error, "failed to send reply");
        }
    }
}
