use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::*;
use crate::client::{ClientState, HandlerError, MessageHandler, message_handler};
use crate::message::Message;
use crate::transport::{MemoryBroker, OutboundRecord, TransportError};
use crate::utils::MessagingError;

fn fast_config() -> BrokerConfig {
    BrokerConfig::new(vec!["memory:9092".to_string()])
        .with_publish_timeout(Duration::from_millis(500))
        .with_subscribe_timeout(Duration::from_millis(100))
        .with_retry_interval(Duration::from_millis(10))
        .with_max_retries(3)
}

fn client(broker: &MemoryBroker) -> BrokerClient {
    BrokerClient::new(Arc::new(broker.clone()), fast_config()).unwrap()
}

fn channel_handler() -> (Arc<dyn MessageHandler>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = message_handler(move |msg: Message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(msg);
            Ok(())
        }
    });
    (handler, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("handler channel closed")
}

#[test]
fn test_config_defaults_fill_zero_values() {
    let config = BrokerConfig {
        brokers: vec!["b:9092".to_string()],
        client_id: String::new(),
        group_id: String::new(),
        publish_timeout: Duration::ZERO,
        subscribe_timeout: Duration::ZERO,
        max_retries: 0,
        retry_interval: Duration::ZERO,
    }
    .with_defaults();

    assert_eq!(config, BrokerConfig::new(vec!["b:9092".to_string()]));
    assert_eq!(config.client_id, "messaging");
    assert_eq!(config.group_id, "messaging-group");
    assert_eq!(config.publish_timeout, Duration::from_secs(5));
    assert_eq!(config.max_retries, 3);
}

#[test]
fn test_new_requires_brokers() {
    let result = BrokerClient::new(Arc::new(MemoryBroker::new()), BrokerConfig::default());
    assert!(matches!(result, Err(MessagingError::NoBrokers)));
}

#[tokio::test]
async fn test_publish_writes_keyed_record() {
    let broker = MemoryBroker::new();
    let client = client(&broker);

    client
        .publish("orders", Message::new("order.created"))
        .await
        .unwrap();

    let records = broker.records("orders");
    assert_eq!(records.len(), 1);
    let stored = Message::decode(&records[0].value).unwrap();
    assert!(stored.id.starts_with("msg-"));
    assert!(stored.created_at.is_some());
    assert_eq!(records[0].key.as_deref(), Some(stored.id.as_bytes()));
    assert_eq!(records[0].header("type"), Some(&b"order.created"[..]));
    assert_eq!(Some(records[0].timestamp), stored.created_at);
}

#[tokio::test]
async fn test_subscriber_receives_backlog_and_new_messages() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    client
        .publish("orders", Message::new("first").with_id("m1"))
        .await
        .unwrap();

    let (handler, mut rx) = channel_handler();
    client.subscribe("orders", handler).await.unwrap();
    client
        .publish("orders", Message::new("second").with_id("m2"))
        .await
        .unwrap();

    assert_eq!(next(&mut rx).await.id, "m1");
    assert_eq!(next(&mut rx).await.id, "m2");
    assert_eq!(client.subscriptions(), vec!["orders".to_string()]);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_double_subscribe_is_rejected() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    let (first, _rx1) = channel_handler();
    let (second, _rx2) = channel_handler();

    client.subscribe("orders", first).await.unwrap();
    let err = client.subscribe("orders", second).await.unwrap_err();

    assert!(matches!(err, MessagingError::AlreadySubscribed(topic) if topic == "orders"));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_unknown_topic() {
    let broker = MemoryBroker::new();
    let client = client(&broker);

    let err = client.unsubscribe("ghost").await.unwrap_err();
    assert!(matches!(err, MessagingError::TopicNotFound(topic) if topic == "ghost"));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    let (handler, mut rx) = channel_handler();

    client.subscribe("orders", handler).await.unwrap();
    client.unsubscribe("orders").await.unwrap();
    client.publish("orders", Message::new("late")).await.unwrap();

    assert!(
        timeout(Duration::from_millis(100), rx.recv())
            .await
            .map_or(true, |msg| msg.is_none())
    );
    assert!(client.subscriptions().is_empty());

    let (handler, mut rx) = channel_handler();
    client.subscribe("orders", handler).await.unwrap();
    assert_eq!(next(&mut rx).await.message_type, "late");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_publish_timeout_is_distinct() {
    let broker = MemoryBroker::new();
    let client = BrokerClient::new(
        Arc::new(broker.clone()),
        fast_config().with_publish_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    broker.faults().delay_writes(Duration::from_millis(300));

    let err = client
        .publish("orders", Message::new("slow"))
        .await
        .unwrap_err();

    assert!(err.is_publish_timeout());
    assert!(matches!(err, MessagingError::PublishTimeout { topic } if topic == "orders"));
}

#[tokio::test]
async fn test_publish_retries_retriable_failures() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    broker.faults().fail_writes(2);

    client.publish("orders", Message::new("retry")).await.unwrap();
    assert_eq!(broker.records("orders").len(), 1);
}

#[tokio::test]
async fn test_publish_gives_up_after_max_retries() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    broker.faults().fail_writes(10);

    let err = client
        .publish("orders", Message::new("doomed"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MessagingError::Transport(TransportError::Broker(_))
    ));
    assert!(broker.records("orders").is_empty());
}

#[tokio::test]
async fn test_read_failures_are_retried() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    broker.faults().fail_reads(2);

    let (handler, mut rx) = channel_handler();
    client.subscribe("orders", handler).await.unwrap();
    client
        .publish("orders", Message::new("after-failures"))
        .await
        .unwrap();

    assert_eq!(next(&mut rx).await.message_type, "after-failures");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_records_are_skipped() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    broker.append(OutboundRecord::new("orders", b"{not json".to_vec()));
    client
        .publish("orders", Message::new("valid"))
        .await
        .unwrap();

    let (handler, mut rx) = channel_handler();
    client.subscribe("orders", handler).await.unwrap();

    assert_eq!(next(&mut rx).await.message_type, "valid");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_handler_errors_and_timeouts_do_not_stop_the_loop() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handler = message_handler(move |msg: Message| {
        let tx = tx.clone();
        async move {
            match msg.message_type.as_str() {
                "fail" => Err(HandlerError::from("handler refused")),
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
                _ => {
                    let _ = tx.send(msg);
                    Ok(())
                }
            }
        }
    });
    client.subscribe("orders", handler).await.unwrap();

    for message_type in ["fail", "hang", "ok"] {
        client
            .publish("orders", Message::new(message_type))
            .await
            .unwrap();
    }

    assert_eq!(next(&mut rx).await.message_type, "ok");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_waits_for_loops_and_is_final() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    let mut alive = Vec::new();

    for topic in ["orders", "payments"] {
        let (alive_tx, alive_rx) = oneshot::channel::<()>();
        let handler = message_handler(move |_msg: Message| {
            let _held = &alive_tx;
            async { Ok(()) }
        });
        client.subscribe(topic, handler).await.unwrap();
        client.publish(topic, Message::new("x")).await.unwrap();
        alive.push(alive_rx);
    }

    client.close().await.unwrap();
    for mut alive_rx in alive {
        assert!(matches!(
            alive_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
    assert_eq!(client.state(), ClientState::Closed);

    client.close().await.unwrap();
    assert!(matches!(
        client.publish("orders", Message::new("y")).await,
        Err(MessagingError::Closed)
    ));
    let (handler, _rx) = channel_handler();
    assert!(matches!(
        client.subscribe("orders", handler).await,
        Err(MessagingError::Closed)
    ));
}

#[tokio::test]
async fn test_finished_loops_are_not_kept_after_unsubscribe() {
    let broker = MemoryBroker::new();
    let client = client(&broker);

    for _ in 0..5 {
        let (handler, _rx) = channel_handler();
        client.subscribe("orders", handler).await.unwrap();
        client.unsubscribe("orders").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(client.retired_loops() <= 1);
    client.close().await.unwrap();
    assert_eq!(client.retired_loops(), 0);
}

#[tokio::test]
async fn test_ping_reports_broker_reachability() {
    let broker = MemoryBroker::new();
    let client = client(&broker);
    client.ping().await.unwrap();

    broker.faults().fail_pings(1);
    assert!(matches!(
        client.ping().await,
        Err(MessagingError::Transport(TransportError::Broker(_)))
    ));
    client.ping().await.unwrap();

    client.close().await.unwrap();
    assert!(matches!(client.ping().await, Err(MessagingError::Closed)));
}

#[tokio::test]
async fn test_clients_in_one_group_share_the_topic() {
    let broker = MemoryBroker::new();
    let producer = client(&broker);
    let first = client(&broker);
    let second = client(&broker);
    let (tx, mut rx) = mpsc::unbounded_channel();

    for (name, consumer) in [("first", &first), ("second", &second)] {
        let tx = tx.clone();
        let handler = message_handler(move |msg: Message| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((name, msg.id));
                Ok(())
            }
        });
        consumer.subscribe("jobs", handler).await.unwrap();
    }

    for i in 0..6 {
        producer
            .publish("jobs", Message::new("job").with_id(format!("job-{i}")))
            .await
            .unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..6 {
        let (_, id) = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        ids.push(id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
    assert!(
        timeout(Duration::from_millis(50), rx.recv())
            .await
            .is_err()
    );

    for c in [producer, first, second] {
        c.close().await.unwrap();
    }
}
