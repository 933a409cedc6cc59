//! Builds the configured client and owns its shutdown.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::broker::BrokerClient;
use crate::client::{MessagingClient, PatternClient};
use crate::config::MessagingSettings;
use crate::local::LocalClient;
use crate::patterns::{
    ConsumerGroupClient, ExactlyOnceClient, Pattern, PubSubClient, QueueClient,
};
use crate::transport::Connection;
use crate::utils::Result;

/// Which structured client [`ClientFactory::client`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process broadcast, nothing leaves the process.
    Local,
    #[default]
    Broker,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Broker => f.write_str("broker"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "broker" => Ok(Backend::Broker),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Creates clients over one broker connection.
#[derive(Clone)]
pub struct ClientFactory {
    connection: Arc<dyn Connection>,
}

impl ClientFactory {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }

    /// Builds the structured client selected by `settings.backend`.
    pub fn client(&self, settings: &MessagingSettings) -> Result<Arc<dyn MessagingClient>> {
        let client: Arc<dyn MessagingClient> = match settings.backend {
            Backend::Local => Arc::new(LocalClient::new()),
            Backend::Broker => Arc::new(BrokerClient::new(
                Arc::clone(&self.connection),
                settings.broker_config(),
            )?),
        };
        Ok(client)
    }

    pub async fn pattern_client(
        &self,
        settings: &MessagingSettings,
        pattern: Pattern,
    ) -> Result<Box<dyn PatternClient>> {
        let connection = self.connection.as_ref();
        let client: Box<dyn PatternClient> = match pattern {
            Pattern::PubSub => {
                Box::new(PubSubClient::new(connection, settings.pubsub_config()).await?)
            }
            Pattern::Queue => Box::new(QueueClient::new(connection, settings.queue_config()).await?),
            Pattern::ConsumerGroup => Box::new(
                ConsumerGroupClient::new(connection, settings.consumer_group_config()).await?,
            ),
            Pattern::ExactlyOnce => Box::new(
                ExactlyOnceClient::new(connection, settings.exactly_once_config()).await?,
            ),
        };
        Ok(client)
    }
}

/// The application's messaging client together with its stop hook.
pub struct MessagingModule {
    settings: MessagingSettings,
    client: Arc<dyn MessagingClient>,
}

impl MessagingModule {
    pub fn start(settings: MessagingSettings, connection: Arc<dyn Connection>) -> Result<Self> {
        let client = ClientFactory::new(connection).client(&settings)?;
        info!(backend = %settings.backend, client_id = %settings.client_id, "messaging module started");
        Ok(Self { settings, client })
    }

    pub fn client(&self) -> Arc<dyn MessagingClient> {
        Arc::clone(&self.client)
    }

    pub fn settings(&self) -> &MessagingSettings {
        &self.settings
    }

    /// Closes the client. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        info!(backend = %self.settings.backend, "closing messaging client");
        self.client.close().await
    }
}

#[cfg(test)]
mod tests;
