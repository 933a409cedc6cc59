use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::factory::Backend;
use crate::patterns::{Pattern, Semantics};
use crate::transport::Offset;

const ENV_KEYS: [&str; 7] = [
    "APP_MESSAGING__BROKERS",
    "APP_MESSAGING__SEMANTICS",
    "APP_MESSAGING__CONCURRENCY",
    "APP_MESSAGING__PUBLISH_TIMEOUT_MS",
    "APP_MESSAGING__PATTERN",
    "APP_MESSAGING__BACKEND",
    "APP_LOGGING__LEVEL",
];

fn unset_env() -> Vec<(&'static str, Option<&'static str>)> {
    ENV_KEYS.iter().map(|key| (*key, None)).collect()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.messaging.backend, Backend::Broker);
    assert_eq!(settings.messaging.pattern, Pattern::PubSub);
    assert_eq!(settings.messaging.brokers, vec!["localhost:9092".to_string()]);
    assert_eq!(settings.messaging.client_id, "messaging");
    assert_eq!(settings.messaging.group_id, "messaging-group");
    assert_eq!(settings.messaging.initial_offset, Offset::Newest);
    assert_eq!(settings.messaging.publish_timeout_ms, 5_000);
    assert_eq!(settings.messaging.semantics, Semantics::BestEffort);
    assert_eq!(settings.messaging.concurrency, 1);
    assert_eq!(settings.messaging.backoff_ms, 200);
    assert_eq!(settings.messaging.request_timeout_ms, 10_000);
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_broker_config_conversion() {
    let mut settings = Settings::default().messaging;
    settings.publish_timeout_ms = 250;
    settings.retry_interval_ms = 0;

    let config = settings.broker_config();
    assert_eq!(config.publish_timeout, Duration::from_millis(250));
    assert_eq!(config.retry_interval, Duration::from_secs(1));
    assert_eq!(config.group_id, "messaging-group");
}

#[test]
fn test_pattern_config_conversion() {
    let mut settings = Settings::default().messaging;
    settings.group_id = "billing".to_string();
    settings.initial_offset = Offset::Oldest;
    settings.transactional_id = "billing-txn".to_string();
    settings.semantics = Semantics::AtLeastOnce;
    settings.concurrency = 3;
    settings.backoff_ms = 50;
    settings.request_timeout_ms = 0;

    let group = settings.consumer_group_config();
    assert_eq!(group.group_id, "billing");
    assert_eq!(group.initial_offset, Offset::Oldest);
    assert_eq!(group.semantics, Semantics::AtLeastOnce);
    assert_eq!(group.concurrency, 3);
    assert_eq!(group.backoff, Duration::from_millis(50));
    let request = settings.request_config();
    assert_eq!(request.group_id, "billing");
    assert_eq!(request.timeout(), Duration::from_secs(10));
    assert_eq!(settings.exactly_once_config().transactional_id, "billing-txn");
    assert_eq!(settings.queue_config().brokers, settings.brokers);
    assert_eq!(settings.pubsub_config().client_id, "messaging");
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("messaging.toml");
    fs::write(
        &path,
        r#"
            [messaging]
            backend = "local"
            pattern = "exactly_once"
            brokers = ["k1:9092", "k2:9092"]
            max_retries = 7

            [logging]
            level = "debug"
        "#,
    )
    .expect("write config file");

    let settings = temp_env::with_vars(unset_env(), || {
        load_config_from(&path).expect("load_config_from failed")
    });

    assert_eq!(settings.messaging.backend, Backend::Local);
    assert_eq!(settings.messaging.pattern, Pattern::ExactlyOnce);
    assert_eq!(
        settings.messaging.brokers,
        vec!["k1:9092".to_string(), "k2:9092".to_string()]
    );
    assert_eq!(settings.messaging.max_retries, 7);
    assert_eq!(settings.logging.level, "debug");
    // untouched fields keep their defaults
    assert_eq!(settings.messaging.client_id, "messaging");
    assert_eq!(settings.messaging.retry_interval_ms, 1_000);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    let tmp = TempDir::new().expect("create tempdir");
    assert!(load_config_from(tmp.path().join("absent.toml")).is_err());
}

#[test]
#[serial]
fn test_environment_overrides() {
    let settings = temp_env::with_vars(
        vec![
            ("APP_MESSAGING__BROKERS", Some("a:9092,b:9092")),
            ("APP_MESSAGING__PUBLISH_TIMEOUT_MS", Some("250")),
            ("APP_MESSAGING__PATTERN", Some("queue")),
            ("APP_MESSAGING__BACKEND", Some("local")),
            ("APP_MESSAGING__SEMANTICS", Some("at_least_once")),
            ("APP_MESSAGING__CONCURRENCY", Some("4")),
            ("APP_LOGGING__LEVEL", Some("warn")),
        ],
        || load_config().expect("load_config failed"),
    );

    assert_eq!(
        settings.messaging.brokers,
        vec!["a:9092".to_string(), "b:9092".to_string()]
    );
    assert_eq!(settings.messaging.publish_timeout_ms, 250);
    assert_eq!(settings.messaging.pattern, Pattern::Queue);
    assert_eq!(settings.messaging.backend, Backend::Local);
    assert_eq!(settings.messaging.semantics, Semantics::AtLeastOnce);
    assert_eq!(settings.messaging.concurrency, 4);
    assert_eq!(settings.logging.level, "warn");
}

#[test]
#[serial]
fn test_environment_beats_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("messaging.toml");
    fs::write(&path, "[messaging]\nclient_id = \"from-file\"\ngroup_id = \"file-group\"\n")
        .expect("write config file");

    let settings = temp_env::with_vars(
        vec![("APP_MESSAGING__CLIENT_ID", Some("from-env"))],
        || load_config_from(&path).expect("load_config_from failed"),
    );

    assert_eq!(settings.messaging.client_id, "from-env");
    assert_eq!(settings.messaging.group_id, "file-group");
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("messaging.toml");
    fs::write(&path, "[messaging]\npattern = \"broadcast\"\n").expect("write config file");

    let result = temp_env::with_vars(unset_env(), || load_config_from(&path));
    assert!(result.is_err());
}
