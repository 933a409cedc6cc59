use std::time::Duration;

use crate::transport::ConnectOptions;

pub const DEFAULT_CLIENT_ID: &str = "messaging";
pub const DEFAULT_GROUP_ID: &str = "messaging-group";
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime settings of a [`super::BrokerClient`].
///
/// Zero or empty values are replaced by the defaults when the client is
/// built, so a config only has to name its brokers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Consumer group every subscription of the client joins.
    pub group_id: String,
    /// Bound on a whole publish, retries included.
    pub publish_timeout: Duration,
    /// Bound on a single handler invocation.
    pub subscribe_timeout: Duration,
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl BrokerConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            ..Self::default()
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

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Replaces zero and empty fields with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.client_id.is_empty() {
            self.client_id = DEFAULT_CLIENT_ID.to_string();
        }
        if self.group_id.is_empty() {
            self.group_id = DEFAULT_GROUP_ID.to_string();
        }
        if self.publish_timeout.is_zero() {
            self.publish_timeout = DEFAULT_PUBLISH_TIMEOUT;
        }
        if self.subscribe_timeout.is_zero() {
            self.subscribe_timeout = DEFAULT_SUBSCRIBE_TIMEOUT;
        }
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.retry_interval.is_zero() {
            self.retry_interval = DEFAULT_RETRY_INTERVAL;
        }
        self
    }

    pub(crate) fn has_brokers(&self) -> bool {
        self.brokers.iter().any(|broker| !broker.trim().is_empty())
    }

    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.brokers.clone(), self.client_id.clone())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}
