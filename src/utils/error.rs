//! Error types returned by the synchronous surface of every client.
//!
//! Errors raised inside background loops are never returned; they are logged
//! where they happen. Everything a caller can observe goes through
//! [`MessagingError`].

use std::fmt;

use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T, E = MessagingError> = std::result::Result<T, E>;

/// Step of a producer transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStage {
    Begin,
    Send,
    Commit,
}

impl fmt::Display for TxnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TxnStage::Begin => "begin",
            TxnStage::Send => "send",
            TxnStage::Commit => "commit",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("no brokers provided")]
    NoBrokers,

    #[error("failed to create {resource}: {source}")]
    Construction {
        resource: &'static str,
        #[source]
        source: TransportError,
    },

    /// The publish deadline expired before the broker accepted the record.
    #[error("publish timeout on topic {topic}")]
    PublishTimeout { topic: String },

    /// No reply with the request's correlation id arrived in time.
    #[error("no reply on topic {topic} for request {correlation_id}")]
    RequestTimeout {
        topic: String,
        correlation_id: String,
    },

    #[error("already subscribed to topic {0}")]
    AlreadySubscribed(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("client is closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to {stage} transaction: {source}")]
    Transaction {
        stage: TxnStage,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MessagingError {
    pub fn is_publish_timeout(&self) -> bool {
        matches!(self, MessagingError::PublishTimeout { .. })
    }
}
