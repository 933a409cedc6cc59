use chrono::TimeZone;
use serde::Deserialize;
use serde_json::json;

use super::*;

#[test]
fn test_stamp_fills_missing_fields() {
    let msg = Message::new("user.created").stamp();

    assert!(msg.id.starts_with("msg-"));
    assert!(msg.created_at.is_some());
}

#[test]
fn test_stamp_keeps_caller_values() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let msg = Message::new("user.created")
        .with_id("fixed-id")
        .with_created_at(at)
        .stamp();

    assert_eq!(msg.id, "fixed-id");
    assert_eq!(msg.created_at, Some(at));
}

#[test]
fn test_generated_ids_are_unique() {
    let ids: Vec<String> = (0..50).map(|_| generate_message_id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();

    assert_eq!(sorted.len(), ids.len());
}

#[test]
fn test_type_field_is_renamed_on_the_wire() {
    let msg = Message::new("order.paid").with_id("m1");
    let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();

    assert_eq!(value["type"], "order.paid");
    assert!(value.get("message_type").is_none());
    assert!(value.get("created_at").is_none());
}

#[test]
fn test_decode_ignores_unknown_and_defaults_missing() {
    let raw = br#"{"id":"m1","type":"ping","priority":7}"#;
    let msg = Message::decode(raw).unwrap();

    assert_eq!(msg.id, "m1");
    assert_eq!(msg.message_type, "ping");
    assert!(msg.data.is_empty());
    assert!(msg.metadata.is_empty());
    assert!(msg.created_at.is_none());
}

#[test]
fn test_decode_rejects_garbage() {
    let err = Message::decode(b"not json").unwrap_err();
    assert!(matches!(err, MessagingError::Decode(_)));
}

#[test]
fn test_data_as_typed_payload() {
    #[derive(Deserialize)]
    struct Order {
        order_id: u64,
        total: f64,
    }

    let msg = Message::new("order.created").with_data(json!({"order_id": 7, "total": 9.5}));
    let order: Order = msg.data_as().unwrap();

    assert_eq!(order.order_id, 7);
    assert_eq!(order.total, 9.5);
}

#[test]
fn test_scalar_data_is_wrapped() {
    let msg = Message::new("counter").with_data(json!(3));
    assert_eq!(msg.data.get("value"), Some(&json!(3)));
}
