mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File, Source};

use crate::config::settings::PartialSettings;

pub use settings::{LoggingSettings, MessagingSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the messaging and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    load(File::with_name("config/default").required(false))
}

/// Same as [`load_config`], but reads the file at `path`, which must exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    load(File::from(path.as_ref()))
}

/// Environment overrides, e.g. `APP_MESSAGING__BROKERS=a:9092,b:9092`.
fn environment() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("messaging.brokers")
        .try_parsing(true)
}

fn load<S>(file: S) -> Result<Settings, ConfigError>
where
    S: Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .add_source(file)
        .add_source(environment())
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();
    let messaging = partial.messaging;
    let logging = partial.logging;

    Ok(Settings {
        messaging: MessagingSettings {
            backend: messaging
                .as_ref()
                .and_then(|m| m.backend)
                .unwrap_or(default.messaging.backend),
            pattern: messaging
                .as_ref()
                .and_then(|m| m.pattern)
                .unwrap_or(default.messaging.pattern),
            brokers: messaging
                .as_ref()
                .and_then(|m| m.brokers.clone())
                .unwrap_or(default.messaging.brokers),
            client_id: messaging
                .as_ref()
                .and_then(|m| m.client_id.clone())
                .unwrap_or(default.messaging.client_id),
            group_id: messaging
                .as_ref()
                .and_then(|m| m.group_id.clone())
                .unwrap_or(default.messaging.group_id),
            transactional_id: messaging
                .as_ref()
                .and_then(|m| m.transactional_id.clone())
                .unwrap_or(default.messaging.transactional_id),
            initial_offset: messaging
                .as_ref()
                .and_then(|m| m.initial_offset)
                .unwrap_or(default.messaging.initial_offset),
            semantics: messaging
                .as_ref()
                .and_then(|m| m.semantics)
                .unwrap_or(default.messaging.semantics),
            concurrency: messaging
                .as_ref()
                .and_then(|m| m.concurrency)
                .unwrap_or(default.messaging.concurrency),
            backoff_ms: messaging
                .as_ref()
                .and_then(|m| m.backoff_ms)
                .unwrap_or(default.messaging.backoff_ms),
            request_timeout_ms: messaging
                .as_ref()
                .and_then(|m| m.request_timeout_ms)
                .unwrap_or(default.messaging.request_timeout_ms),
            publish_timeout_ms: messaging
                .as_ref()
                .and_then(|m| m.publish_timeout_ms)
                .unwrap_or(default.messaging.publish_timeout_ms),
            subscribe_timeout_ms: messaging
                .as_ref()
                .and_then(|m| m.subscribe_timeout_ms)
                .unwrap_or(default.messaging.subscribe_timeout_ms),
            max_retries: messaging
                .as_ref()
                .and_then(|m| m.max_retries)
                .unwrap_or(default.messaging.max_retries),
            retry_interval_ms: messaging
                .as_ref()
                .and_then(|m| m.retry_interval_ms)
                .unwrap_or(default.messaging.retry_interval_ms),
        },
        logging: LoggingSettings {
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}

#[cfg(test)]
mod tests;
