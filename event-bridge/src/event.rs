use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::time::{ms_to_rfc3339, now_ms, now_rfc3339};

/// Vendor-shaped record as handed over by the capture layer. The payload is
/// kept opaque: the capture layer drains whatever the web client emits, and
/// most of it is noise we only inspect field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub category: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "now_ms")]
    pub captured_at_ms: i64,
}

impl RawEvent {
    pub fn new(category: impl Into<String>, payload: Value) -> RawEvent {
        RawEvent {
            category: category.into(),
            payload,
            captured_at_ms: now_ms(),
        }
    }

    /// Vendor subcategory, when the payload carries one (`type` field).
    pub fn subcategory(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Best-effort stable entity identifier for deduplication. Message-like
    /// payloads carry either a plain string `id` or a serialized id object;
    /// roster/presence payloads identify the remote party instead.
    pub fn entity_id(&self) -> Option<String> {
        match self.payload.get("id") {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(obj)) => {
                if let Some(s) = obj.get("_serialized").and_then(Value::as_str) {
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
            _ => {}
        }
        self.payload
            .get("jid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// RFC 3339 rendering of the capture timestamp, falling back to the
    /// current time when the capture layer handed us garbage.
    pub fn timestamp(&self) -> String {
        ms_to_rfc3339(self.captured_at_ms).unwrap_or_else(now_rfc3339)
    }
}

/// Category of a normalized event, used for routing and stats labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Message,
    MessageStatus,
    SettingsChange,
    Notification,
    Revocation,
    GroupAction,
    Contact,
    GroupMembership,
    Presence,
    /// Unmatched raw envelope passed through unchanged.
    Raw,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Message => "message",
            EventCategory::MessageStatus => "message_status",
            EventCategory::SettingsChange => "settings_change",
            EventCategory::Notification => "notification",
            EventCategory::Revocation => "revocation",
            EventCategory::GroupAction => "group_action",
            EventCategory::Contact => "contact",
            EventCategory::GroupMembership => "group_membership",
            EventCategory::Presence => "presence",
            EventCategory::Raw => "raw",
        }
    }
}

/// Canonicalized, schema-stable output of the transformation engine. One
/// raw event maps to at most one of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub timestamp: String,
    pub category: EventCategory,
    pub body: Value,
}

impl NormalizedEvent {
    /// Build a normalized event from a raw one. The internal event id is
    /// fresh per emission; the timestamp is the capture time, not the
    /// emission time, so replays of the same capture batch stay comparable.
    pub fn from_raw(raw: &RawEvent, category: EventCategory, body: Value) -> NormalizedEvent {
        NormalizedEvent {
            id: Uuid::now_v7().to_string(),
            timestamp: raw.timestamp(),
            category,
            body,
        }
    }

    /// Broker payload: `{internal_event_id, timestamp, data}` with the
    /// category name embedded in `data` as `event`.
    pub fn wire_payload(&self) -> Value {
        let mut data = self.body.clone();
        if let Value::Object(map) = &mut data {
            map.insert("event".to_string(), json!(self.category.as_str()));
        }
        json!({
            "internal_event_id": self.id,
            "timestamp": self.timestamp,
            "data": data,
        })
    }
}

/// Envelope for events matched by an ignore rule: the original record is
/// preserved verbatim under `data`.
pub fn ignored_envelope(raw: &RawEvent) -> Value {
    json!({
        "id": Uuid::now_v7().to_string(),
        "timestamp": raw.timestamp(),
        "data": raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;

    #[test]
    fn entity_id_prefers_serialized_message_id() {
        let raw = RawEvent::new(
            "message",
            json!({"id": {"_serialized": "true_123@c.us_ABC"}, "jid": "123@c.us"}),
        );
        assert_eq!(raw.entity_id().as_deref(), Some("true_123@c.us_ABC"));
    }

    #[test]
    fn entity_id_falls_back_to_jid() {
        let raw = RawEvent::new("contact", json!({"jid": "123@c.us"}));
        assert_eq!(raw.entity_id().as_deref(), Some("123@c.us"));
    }

    #[test]
    fn entity_id_absent_for_unidentifiable_payloads() {
        let raw = RawEvent::new("message", json!({"id": "", "body": "hello"}));
        assert_eq!(raw.entity_id(), None);
        let raw = RawEvent::new("message", json!(null));
        assert_eq!(raw.entity_id(), None);
    }

    #[test]
    fn wire_payload_shape() {
        let raw = RawEvent {
            category: "message".to_string(),
            payload: json!({}),
            captured_at_ms: 1_700_000_000_000,
        };
        let event = NormalizedEvent::from_raw(&raw, EventCategory::Message, json!({"body": "hi"}));
        let wire = event.wire_payload();
        assert_json_include!(
            actual: wire.clone(),
            expected: json!({
                "timestamp": "2023-11-14T22:13:20Z",
                "data": {"event": "message", "body": "hi"},
            })
        );
        assert!(wire.get("internal_event_id").is_some());
    }

    #[test]
    fn ignored_envelope_preserves_raw_record() {
        let raw = RawEvent {
            category: "message".to_string(),
            payload: json!({"type": "ciphertext", "id": "X"}),
            captured_at_ms: 1_700_000_000_000,
        };
        let wire = ignored_envelope(&raw);
        assert_json_include!(
            actual: wire,
            expected: json!({
                "data": {
                    "category": "message",
                    "payload": {"type": "ciphertext", "id": "X"},
                    "captured_at_ms": 1_700_000_000_000i64,
                },
            })
        );
    }
}
