//! Durable chat message mapper: plain and media messages.

use serde_json::{json, Value};

use crate::event::{EventCategory, NormalizedEvent, RawEvent};
use crate::transform::ack::lifecycle_state;
use crate::transform::jid;
use crate::transform::MapOutcome;

/// Vendor message types this mapper owns. Notification-style types are
/// handled earlier in the chain; everything else falls through.
const MESSAGE_TYPES: &[&str] = &[
    "chat", "image", "video", "ptt", "audio", "document", "sticker", "location",
];

pub fn map(raw: &RawEvent) -> MapOutcome {
    if raw.category != "message" {
        return MapOutcome::Decline;
    }
    let Some(kind) = raw.subcategory() else {
        return MapOutcome::Decline;
    };
    if !MESSAGE_TYPES.contains(&kind) {
        return MapOutcome::Decline;
    }

    let payload = &raw.payload;
    let chat = payload
        .get("chat")
        .or_else(|| payload.get("from"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let group = jid::is_group(chat);
    let participant = payload.get("participant").and_then(Value::as_str);
    let from = match (group, participant) {
        (true, Some(participant)) => jid::normalize(participant),
        _ => jid::normalize(payload.get("from").and_then(Value::as_str).unwrap_or(chat)),
    };

    // A message record may already carry an ack level (sent from another
    // device); otherwise it is a fresh creation.
    let state = payload
        .get("ack")
        .and_then(Value::as_i64)
        .and_then(lifecycle_state)
        .unwrap_or("created");

    // Text body for text, caption for media; missing fields degrade to
    // null rather than failing the event.
    let text = payload
        .get("body")
        .or_else(|| payload.get("caption"))
        .cloned()
        .unwrap_or(Value::Null);

    let body = json!({
        "id": raw.entity_id(),
        "kind": kind,
        "state": state,
        "from": from,
        "to": jid::normalize(payload.get("to").and_then(Value::as_str).unwrap_or_default()),
        "chat": jid::normalize(chat),
        "group": group,
        "body": text,
    });
    MapOutcome::Mapped(NormalizedEvent::from_raw(raw, EventCategory::Message, body))
}
