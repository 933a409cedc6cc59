use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broker::BrokerConfig;
use crate::factory::Backend;
use crate::patterns::{
    ConsumerGroupConfig, ExactlyOnceConfig, Pattern, PubSubConfig, QueueConfig, RequestConfig,
    Semantics,
};
use crate::transport::Offset;

/// Top-level configuration settings for the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub messaging: MessagingSettings,
    pub logging: LoggingSettings,
}

/// Configuration of the messaging client the application builds.
///
/// Timeouts and intervals are in milliseconds. Zero values fall back to the
/// client defaults when converted with [`MessagingSettings::broker_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingSettings {
    pub backend: Backend,
    pub pattern: Pattern,
    pub brokers: Vec<String>,
    pub client_id: String,
    pub group_id: String,
    pub transactional_id: String,
    pub initial_offset: Offset,
    pub semantics: Semantics,
    pub concurrency: usize,
    pub backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

/// Configuration settings for log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl MessagingSettings {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            brokers: self.brokers.clone(),
            client_id: self.client_id.clone(),
            group_id: self.group_id.clone(),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            subscribe_timeout: Duration::from_millis(self.subscribe_timeout_ms),
            max_retries: self.max_retries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
        .with_defaults()
    }

    pub fn pubsub_config(&self) -> PubSubConfig {
        PubSubConfig::new(self.brokers.clone()).with_client_id(self.client_id.clone())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.brokers.clone()).with_client_id(self.client_id.clone())
    }

    pub fn consumer_group_config(&self) -> ConsumerGroupConfig {
        ConsumerGroupConfig::new(self.brokers.clone(), self.group_id.clone())
            .with_client_id(self.client_id.clone())
            .with_initial_offset(self.initial_offset)
            .with_semantics(self.semantics)
            .with_concurrency(self.concurrency)
            .with_backoff(Duration::from_millis(self.backoff_ms))
    }

    pub fn request_config(&self) -> RequestConfig {
        RequestConfig::new(self.brokers.clone())
            .with_client_id(self.client_id.clone())
            .with_group_id(self.group_id.clone())
            .with_timeout(Duration::from_millis(self.request_timeout_ms))
    }

    pub fn exactly_once_config(&self) -> ExactlyOnceConfig {
        ExactlyOnceConfig::new(self.brokers.clone())
            .with_client_id(self.client_id.clone())
            .with_transactional_id(self.transactional_id.clone())
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Any field may be left out; missing values are filled from the defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub messaging: Option<PartialMessagingSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMessagingSettings {
    pub backend: Option<Backend>,
    pub pattern: Option<Pattern>,
    pub brokers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub group_id: Option<String>,
    pub transactional_id: Option<String>,
    pub initial_offset: Option<Offset>,
    pub semantics: Option<Semantics>,
    pub concurrency: Option<usize>,
    pub backoff_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
    pub subscribe_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            messaging: MessagingSettings {
                backend: Backend::Broker,
                pattern: Pattern::PubSub,
                brokers: vec!["localhost:9092".to_string()],
                client_id: "messaging".to_string(),
                group_id: "messaging-group".to_string(),
                transactional_id: String::new(),
                initial_offset: Offset::Newest,
                semantics: Semantics::BestEffort,
                concurrency: 1,
                backoff_ms: 200,
                request_timeout_ms: 10_000,
                publish_timeout_ms: 5_000,
                subscribe_timeout_ms: 5_000,
                max_retries: 3,
                retry_interval_ms: 1_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
