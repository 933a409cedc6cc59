use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::client::{ClientState, Publisher, Subscriber, message_handler, payload_handler};
use crate::config::Settings;
use crate::message::Message;
use crate::transport::{MemoryBroker, Offset};
use crate::utils::MessagingError;

fn settings(backend: Backend) -> MessagingSettings {
    let mut settings = Settings::default().messaging;
    settings.backend = backend;
    settings.brokers = vec!["memory:9092".to_string()];
    settings.retry_interval_ms = 10;
    settings
}

#[test]
fn test_backend_parsing() {
    assert_eq!("local".parse::<Backend>().unwrap(), Backend::Local);
    assert_eq!(" Broker ".parse::<Backend>().unwrap(), Backend::Broker);
    assert!("kafka".parse::<Backend>().is_err());
    assert_eq!(Backend::Local.to_string(), "local");
}

#[tokio::test]
async fn test_factory_builds_local_client() {
    let broker = MemoryBroker::new();
    let factory = ClientFactory::new(Arc::new(broker.clone()));
    let client = factory.client(&settings(Backend::Local)).unwrap();

    client.publish("users", Message::new("created")).await.unwrap();
    assert!(broker.records("users").is_empty());
}

#[tokio::test]
async fn test_factory_builds_broker_client() {
    let broker = MemoryBroker::new();
    let factory = ClientFactory::new(Arc::new(broker.clone()));
    let client = factory.client(&settings(Backend::Broker)).unwrap();

    client.publish("users", Message::new("created")).await.unwrap();
    assert_eq!(broker.records("users").len(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_broker_backend_without_brokers_fails() {
    let factory = ClientFactory::new(Arc::new(MemoryBroker::new()));
    let mut settings = settings(Backend::Broker);
    settings.brokers.clear();

    assert!(matches!(
        factory.client(&settings),
        Err(MessagingError::NoBrokers)
    ));
    assert!(matches!(
        factory.pattern_client(&settings, Pattern::Queue).await,
        Err(MessagingError::NoBrokers)
    ));
}

#[tokio::test]
async fn test_factory_builds_each_pattern() {
    let factory = ClientFactory::new(Arc::new(MemoryBroker::new()));
    let mut settings = settings(Backend::Broker);
    settings.initial_offset = Offset::Oldest;

    for pattern in Pattern::ALL {
        let client = factory.pattern_client(&settings, pattern).await.unwrap();
        assert_eq!(client.pattern(), pattern);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = payload_handler(move |payload: Vec<u8>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
                Ok(())
            }
        });
        let topic = format!("factory-{pattern}");
        client.subscribe(&topic, handler).await.unwrap();
        client.publish(&topic, b"hello".to_vec()).await.unwrap();

        let got = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, b"hello".to_vec());
        client.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_module_shutdown_closes_client() {
    let broker = MemoryBroker::new();
    let module = MessagingModule::start(settings(Backend::Broker), Arc::new(broker)).unwrap();
    let client = module.client();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            "orders",
            message_handler(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(msg.message_type);
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();
    client.publish("orders", Message::new("placed")).await.unwrap();
    let got = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(got.as_deref(), Some("placed"));

    module.shutdown().await.unwrap();
    module.shutdown().await.unwrap();
    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(module.settings().backend, Backend::Broker);
}
