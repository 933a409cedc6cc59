//! The message envelope carried by every client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{MessagingError, Result};

/// Represents one message travelling through a client.
///
/// The envelope is encoded as a JSON object. Decoding ignores unknown fields
/// and fills missing ones with defaults, so producers running a newer version
/// of the envelope never break older consumers.
///
/// # Fields
///
/// - `id` - Unique identifier. Generated on publish when left empty.
/// - `message_type` - Application-level discriminator, encoded as `type`.
/// - `data` - Structured payload.
/// - `metadata` - Free-form string headers.
/// - `created_at` - Creation time. Set to now on publish when absent.
///
/// # Example
///
/// ```rust
/// use messaging::message::Message;
/// use serde_json::json;
///
/// let msg = Message::new("order.created")
///     .with_data(json!({ "order_id": 42 }))
///     .with_metadata("source", "checkout");
///
/// let bytes = msg.encode().unwrap();
/// let back = Message::decode(&bytes).unwrap();
/// assert_eq!(back.message_type, "order.created");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Replaces the payload. Values that are not JSON objects are stored
    /// under a single `value` key.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = match data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Fills in a generated id and the current time where they are missing.
    pub fn stamp(mut self) -> Self {
        if self.id.is_empty() {
            self.id = generate_message_id();
        }
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(MessagingError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(MessagingError::Decode)
    }

    /// Deserializes the payload into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone()))
            .map_err(MessagingError::Decode)
    }
}

/// Time-ordered message id, e.g. `msg-01890a5d-ac96-774b-bcce-b302099a8057`.
pub fn generate_message_id() -> String {
    format!("msg-{}", Uuid::now_v7())
}

#[cfg(test)]
mod tests;
