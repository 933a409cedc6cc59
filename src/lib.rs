//! # messaging
//!
//! `messaging` is a small abstraction layer over a partitioned, log-based
//! message broker. Application code publishes and subscribes to named topics
//! through a uniform interface and does not care whether delivery happens
//! in-process or through a broker.
//!
//! ## Core Modules
//!
//! - `message`: The JSON envelope every structured client carries.
//! - `client`: The shared client traits, handler adapters and lifecycle states.
//! - `local`: In-process broadcast client, useful for tests and single-process deployments.
//! - `broker`: Structured client backed by topic writers and readers of a broker connection.
//! - `patterns`: Raw-payload clients for pub/sub, queue, consumer group and exactly-once delivery, plus request/reply.
//! - `factory`: Builds the configured client and owns its shutdown.
//! - `transport`: The broker connection port and its in-memory adapter.
//! - `config`: Loads settings from files and `APP_*` environment variables.
//! - `utils`: Error taxonomy, logging setup and shutdown signals.

pub mod broker;
pub mod client;
pub mod config;
pub mod factory;
pub mod local;
pub mod message;
pub mod patterns;
pub mod transport;
pub mod utils;

/// Types most applications need.
pub mod prelude {
    pub use crate::broker::{BrokerClient, BrokerConfig};
    pub use crate::client::{
        ClientState, MessageHandler, MessagingClient, PatternClient, PayloadHandler, Publisher,
        Subscriber, message_handler, payload_handler,
    };
    pub use crate::factory::{Backend, ClientFactory, MessagingModule};
    pub use crate::local::LocalClient;
    pub use crate::message::Message;
    pub use crate::patterns::Pattern;
    pub use crate::transport::{Connection, MemoryBroker, Offset};
    pub use crate::utils::{MessagingError, Result};
}
