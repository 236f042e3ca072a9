//! Roster and liveness mappers: contacts, group membership updates,
//! presence.

use serde_json::{json, Value};

use crate::event::{EventCategory, NormalizedEvent, RawEvent};
use crate::transform::jid;
use crate::transform::MapOutcome;

pub fn map_contact(raw: &RawEvent) -> MapOutcome {
    if raw.category != "contact" {
        return MapOutcome::Decline;
    }
    let payload = &raw.payload;
    let jid_raw = payload.get("jid").and_then(Value::as_str).unwrap_or_default();
    let body = json!({
        "number": jid::normalize(jid_raw),
        "name": payload
            .get("name")
            .or_else(|| payload.get("pushname"))
            .cloned()
            .unwrap_or(Value::Null),
        "is_business": payload.get("is_business").cloned().unwrap_or(Value::Null),
    });
    MapOutcome::Mapped(NormalizedEvent::from_raw(raw, EventCategory::Contact, body))
}

pub fn map_group_update(raw: &RawEvent) -> MapOutcome {
    if raw.category != "group_update" {
        return MapOutcome::Decline;
    }
    let payload = &raw.payload;
    let chat = payload.get("jid").and_then(Value::as_str).unwrap_or_default();
    let participants: Vec<String> = payload
        .get("participants")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(jid::normalize)
                .collect()
        })
        .unwrap_or_default();
    let body = json!({
        "chat": jid::normalize(chat),
        "subject": payload.get("subject").cloned().unwrap_or(Value::Null),
        "participants": participants,
    });
    MapOutcome::Mapped(NormalizedEvent::from_raw(
        raw,
        EventCategory::GroupMembership,
        body,
    ))
}

pub fn map_presence(raw: &RawEvent) -> MapOutcome {
    if raw.category != "presence" {
        return MapOutcome::Decline;
    }
    let payload = &raw.payload;
    let body = json!({
        "from": jid::normalize(payload.get("jid").and_then(Value::as_str).unwrap_or_default()),
        "state": payload.get("type").cloned().unwrap_or(Value::Null),
        "last_seen_ms": payload.get("t").cloned().unwrap_or(Value::Null),
    });
    MapOutcome::Mapped(NormalizedEvent::from_raw(
        raw,
        EventCategory::Presence,
        body,
    ))
}
