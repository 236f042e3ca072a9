//! Acknowledgement progression mapper.
//!
//! Ack levels arrive as a bare integer and are mapped onto a fixed lifecycle
//! vocabulary. Ephemeral content (the status broadcast feed) is only worth
//! emitting once it carries a known terminal level; durable chat content
//! always gets at least a creation record.

use serde_json::{json, Value};

use crate::event::{EventCategory, NormalizedEvent, RawEvent};
use crate::transform::jid;
use crate::transform::MapOutcome;

/// Lifecycle state for a known ack level. `None` for the creation state
/// (no level yet), which callers map per content kind.
pub fn lifecycle_state(level: i64) -> Option<&'static str> {
    match level {
        1 => Some("sent"),
        2 => Some("delivered"),
        3 => Some("read"),
        4 => Some("played"),
        _ => None,
    }
}

pub fn map(raw: &RawEvent) -> MapOutcome {
    if raw.category != "message_ack" {
        return MapOutcome::Decline;
    }

    let payload = &raw.payload;
    let chat = payload
        .get("chat")
        .or_else(|| payload.get("to"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let ephemeral = jid::is_status_broadcast(chat);

    let state = match payload.get("ack").and_then(Value::as_i64) {
        Some(level) => match lifecycle_state(level) {
            Some(state) => state,
            // Unknown level: ephemeral content without a terminal ack is
            // not worth emitting; durable content still gets a creation
            // record.
            None if ephemeral => return MapOutcome::Suppress,
            None => "created",
        },
        None => "created",
    };

    let group = jid::is_group(chat);
    let participant = payload.get("participant").and_then(Value::as_str);
    let from = match (group, participant) {
        // Group-scoped: the acting party is the participant, not the
        // conversation.
        (true, Some(participant)) => jid::normalize(participant),
        _ => jid::normalize(payload.get("from").and_then(Value::as_str).unwrap_or(chat)),
    };

    let body = json!({
        "id": raw.entity_id(),
        "state": state,
        "from": from,
        "chat": jid::normalize(chat),
        "group": group,
        "ephemeral": ephemeral,
    });
    MapOutcome::Mapped(NormalizedEvent::from_raw(
        raw,
        EventCategory::MessageStatus,
        body,
    ))
}
