//! Delivery-pattern clients.
//!
//! Each client owns its own broker resources and implements one delivery
//! guarantee on top of the transport primitives:
//!
//! - [`PubSubClient`]: fan-out, consumers only see messages published after
//!   they subscribe.
//! - [`QueueClient`]: work queue, a new consumer starts from the oldest
//!   retained message.
//! - [`ConsumerGroupClient`]: partitions shared among group members, offsets
//!   committed after each message.
//! - [`ExactlyOnceClient`]: transactional writes, at-least-once reads.
//!
//! All four implement [`crate::client::PatternClient`] and can be swapped
//! behind it. [`RequestClient`] adds request/reply on top of the same
//! primitives.

mod config;
mod consumer_group;
mod exactly_once;
mod partition;
mod pubsub;
mod queue;
mod request;
mod workers;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use config::{
    ConsumerGroupConfig, DEFAULT_BACKOFF, DEFAULT_REQUEST_TIMEOUT, ExactlyOnceConfig,
    PubSubConfig, QueueConfig, RequestConfig, Semantics,
};
pub use consumer_group::ConsumerGroupClient;
pub use exactly_once::ExactlyOnceClient;
pub use pubsub::PubSubClient;
pub use queue::QueueClient;
pub use request::{
    CORRELATION_ID_HEADER, REPLY_TO_HEADER, ReplyHandler, RequestClient, reply_handler,
};

/// Delivery pattern a [`crate::client::PatternClient`] implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Pattern {
    #[default]
    #[serde(rename = "pubsub", alias = "pub_sub")]
    PubSub,
    #[serde(rename = "queue")]
    Queue,
    #[serde(rename = "consumer_group", alias = "consumer-group")]
    ConsumerGroup,
    #[serde(rename = "exactly_once", alias = "exactly-once")]
    ExactlyOnce,
}

impl Pattern {
    pub const ALL: [Pattern; 4] = [
        Pattern::PubSub,
        Pattern::Queue,
        Pattern::ConsumerGroup,
        Pattern::ExactlyOnce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::PubSub => "pubsub",
            Pattern::Queue => "queue",
            Pattern::ConsumerGroup => "consumer_group",
            Pattern::ExactlyOnce => "exactly_once",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pubsub" | "pub_sub" => Ok(Pattern::PubSub),
            "queue" => Ok(Pattern::Queue),
            "consumer_group" => Ok(Pattern::ConsumerGroup),
            "exactly_once" => Ok(Pattern::ExactlyOnce),
            other => Err(format!("unknown delivery pattern: {other}")),
        }
    }
}
