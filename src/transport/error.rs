use thiserror::Error;

/// Failure reported by a broker connection resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no brokers provided")]
    NoBrokers,

    #[error("resource closed")]
    Closed,

    #[error("unknown partition {partition} for topic {topic}")]
    UnknownPartition { topic: String, partition: i32 },

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("transaction already in progress")]
    TransactionInProgress,

    #[error("broker error: {0}")]
    Broker(String),

    #[error("operation timed out")]
    Timeout,
}

impl TransportError {
    /// Whether repeating the same call may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportError::Broker(_) | TransportError::Timeout)
    }
}
