//! The `transport` module is the seam between clients and a message broker.
//!
//! It defines the record types and connection traits every client is written
//! against, and ships [`MemoryBroker`], an in-process implementation with
//! partitioned logs, consumer groups and transactions.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::TransportError;
pub use memory::{Faults, MemoryBroker, TransactionStats};
pub use record::{Header, Offset, OutboundRecord, Record};
pub use traits::{
    Claim, ClaimHandler, ConnectOptions, Connection, Consumer, ConsumerGroup, GroupOptions,
    GroupSession, PartitionConsumer, ReaderOptions, SyncProducer, TopicReader, TopicWriter,
    TransactionalProducer,
};
