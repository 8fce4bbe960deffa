use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire format of every event on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Stable across redeliveries of the same event
    pub event_id: Uuid,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(routing_key: &str, payload: serde_json::Value) -> Self {
        Self::with_id(Uuid::new_v4(), routing_key, payload)
    }

    /// Envelope with a caller-chosen id (outbox rows reuse their row id)
    pub fn with_id(event_id: Uuid, routing_key: &str, payload: serde_json::Value) -> Self {
        Self {
            event_id,
            routing_key: routing_key.to_string(),
            payload,
            published_at: Utc::now(),
        }
    }

    /// Message key: the payload's `postId` when it has one, so every event
    /// about one post lands in the same partition
    pub fn partition_key(&self) -> &str {
        self.payload
            .get("postId")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.routing_key)
    }

    /// Decode the payload into a typed event
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_names() {
        let envelope = EventEnvelope::new("post.created", json!({"postId": "x"}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["routingKey"], "post.created");
        assert!(value.get("eventId").is_some());
        assert!(value.get("publishedAt").is_some());
        assert_eq!(value["payload"]["postId"], "x");
    }

    #[test]
    fn test_partition_key_follows_post_id() {
        let created = EventEnvelope::new("post.created", json!({"postId": "p-1", "content": "hi"}));
        let deleted = EventEnvelope::new("post.deleted", json!({"postId": "p-1", "mediaIds": []}));
        assert_eq!(created.partition_key(), "p-1");
        assert_eq!(created.partition_key(), deleted.partition_key());

        let other = EventEnvelope::new("user.updated", json!({"userId": "u-1"}));
        assert_eq!(other.partition_key(), "user.updated");
    }
}
