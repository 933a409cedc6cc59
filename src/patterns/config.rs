use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broker::config::{DEFAULT_CLIENT_ID, DEFAULT_GROUP_ID};
use crate::transport::{ConnectOptions, Offset};
use crate::utils::{MessagingError, Result};

pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn connect_options(brokers: &[String], client_id: &str) -> Result<ConnectOptions> {
    if brokers.iter().all(|broker| broker.trim().is_empty()) {
        return Err(MessagingError::NoBrokers);
    }
    let client_id = if client_id.is_empty() {
        DEFAULT_CLIENT_ID
    } else {
        client_id
    };
    Ok(ConnectOptions::new(brokers.to_vec(), client_id))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
}

impl PubSubConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        connect_options(&self.brokers, &self.client_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
}

impl QueueConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        connect_options(&self.brokers, &self.client_id)
    }
}

/// When a consumer group marks a record relative to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Semantics {
    /// The handler runs, then the record is marked whatever the outcome.
    /// Failures are logged and never redelivered.
    #[default]
    BestEffort,
    /// The record is marked before the handler runs.
    #[serde(alias = "at-most-once")]
    AtMostOnce,
    /// The record is marked only once its handler succeeds. A failing
    /// handler is retried after the backoff until it succeeds or the
    /// consumer stops, and unmarked records go to the next owner.
    #[serde(alias = "at-least-once")]
    AtLeastOnce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub group_id: String,
    /// Where the group starts on partitions it has never committed.
    pub initial_offset: Offset,
    pub semantics: Semantics,
    /// Group members each subscription runs. Zero counts as one.
    pub concurrency: usize,
    /// Pause before a failed handler is retried under
    /// [`Semantics::AtLeastOnce`].
    pub backoff: Duration,
}

impl ConsumerGroupConfig {
    pub fn new(brokers: Vec<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            group_id: group_id.into(),
            initial_offset: Offset::Newest,
            semantics: Semantics::default(),
            concurrency: 1,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_initial_offset(mut self, offset: Offset) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        connect_options(&self.brokers, &self.client_id)
    }

    pub(crate) fn group_id(&self) -> &str {
        if self.group_id.is_empty() {
            DEFAULT_GROUP_ID
        } else {
            &self.group_id
        }
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub(crate) fn backoff(&self) -> Duration {
        if self.backoff.is_zero() {
            DEFAULT_BACKOFF
        } else {
            self.backoff
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactlyOnceConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Identity of the transactional producer. Derived from the client id
    /// when empty.
    pub transactional_id: String,
}

impl ExactlyOnceConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            transactional_id: String::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_transactional_id(mut self, transactional_id: impl Into<String>) -> Self {
        self.transactional_id = transactional_id.into();
        self
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        connect_options(&self.brokers, &self.client_id)
    }

    pub(crate) fn transactional_id(&self, options: &ConnectOptions) -> String {
        if self.transactional_id.is_empty() {
            format!("{}-txn", options.client_id)
        } else {
            self.transactional_id.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Group the responders of a topic share, so each request is answered
    /// once.
    pub group_id: String,
    /// How long a request waits for its reply. Zero means the default.
    pub timeout: Duration,
}

impl RequestConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn connect_options(&self) -> Result<ConnectOptions> {
        connect_options(&self.brokers, &self.client_id)
    }

    pub(crate) fn group_id(&self) -> &str {
        if self.group_id.is_empty() {
            DEFAULT_GROUP_ID
        } else {
            &self.group_id
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            self.timeout
        }
    }
}
