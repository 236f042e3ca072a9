//! Sub-type dispatch for notification-style message records: template
//! notifications, revocations, and group actions.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::event::{EventCategory, NormalizedEvent, RawEvent};
use crate::transform::jid;
use crate::transform::MapOutcome;

/// Default translation of raw group action codes to emitted action names.
/// Unknown codes pass through unchanged.
pub const DEFAULT_GROUP_ACTIONS: &[(&str, &str)] = &[
    ("add", "join"),
    ("invite", "join"),
    ("remove", "leave"),
    ("leave", "leave"),
    ("promote", "promote"),
    ("demote", "demote"),
    ("subject", "subject_change"),
    ("picture", "picture_change"),
    ("create", "create"),
];

pub fn default_group_actions() -> HashMap<String, String> {
    DEFAULT_GROUP_ACTIONS
        .iter()
        .map(|(raw, name)| (raw.to_string(), name.to_string()))
        .collect()
}

pub fn map(raw: &RawEvent, group_actions: &HashMap<String, String>) -> MapOutcome {
    if raw.category != "message" {
        return MapOutcome::Decline;
    }
    match raw.subcategory() {
        Some("notification_template") => MapOutcome::Mapped(map_template(raw)),
        Some("revoked") => MapOutcome::Mapped(map_revocation(raw)),
        Some("gp2") => MapOutcome::Mapped(map_group_action(raw, group_actions)),
        _ => MapOutcome::Decline,
    }
}

/// Template notifications: a recognized sub-type becomes a dedicated
/// settings-change event; anything else a generic notification carrying the
/// raw sub-type.
fn map_template(raw: &RawEvent) -> NormalizedEvent {
    let payload = &raw.payload;
    let subtype = payload.get("subtype").and_then(Value::as_str);
    let from = jid::normalize(payload.get("from").and_then(Value::as_str).unwrap_or_default());

    match subtype {
        Some("disappearing_mode") => {
            let body = json!({
                "setting": "disappearing_mode",
                "from": from,
                "duration": payload.get("duration").cloned().unwrap_or(Value::Null),
            });
            NormalizedEvent::from_raw(raw, EventCategory::SettingsChange, body)
        }
        _ => {
            let body = json!({
                "subtype": subtype,
                "from": from,
            });
            NormalizedEvent::from_raw(raw, EventCategory::Notification, body)
        }
    }
}

/// Revocation: who revoked, and which message it targeted.
fn map_revocation(raw: &RawEvent) -> NormalizedEvent {
    let payload = &raw.payload;
    let revoked_by = payload
        .get("participant")
        .or_else(|| payload.get("from"))
        .and_then(Value::as_str)
        .map(jid::normalize);
    let target = payload
        .get("target")
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("protocol")
                .and_then(|p| p.get("target"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    let body = json!({
        "revoked_by": revoked_by,
        "target": target,
        "chat": jid::normalize(payload.get("chat").and_then(Value::as_str).unwrap_or_default()),
    });
    NormalizedEvent::from_raw(raw, EventCategory::Revocation, body)
}

/// Group action: translate the raw action code and normalize the recipient
/// list.
fn map_group_action(raw: &RawEvent, group_actions: &HashMap<String, String>) -> NormalizedEvent {
    let payload = &raw.payload;
    let code = payload
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let action = group_actions
        .get(code)
        .map(String::as_str)
        .unwrap_or(code);

    let recipients: Vec<String> = payload
        .get("recipients")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(jid::normalize)
                .collect()
        })
        .unwrap_or_default();

    let chat = payload.get("chat").and_then(Value::as_str).unwrap_or_default();
    let body = json!({
        "action": action,
        "by": payload
            .get("participant")
            .or_else(|| payload.get("from"))
            .and_then(Value::as_str)
            .map(jid::normalize),
        "chat": jid::normalize(chat),
        "recipients": recipients,
    });
    NormalizedEvent::from_raw(raw, EventCategory::GroupAction, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions() -> HashMap<String, String> {
        default_group_actions()
    }

    #[test]
    fn disappearing_mode_becomes_settings_change() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "n1",
                "type": "notification_template",
                "subtype": "disappearing_mode",
                "from": "4915550001@c.us",
                "duration": 604800,
            }),
        );
        let MapOutcome::Mapped(event) = map(&raw, &actions()) else {
            panic!("expected mapped event");
        };
        assert_eq!(event.category, EventCategory::SettingsChange);
        assert_eq!(event.body["setting"], "disappearing_mode");
        assert_eq!(event.body["duration"], 604800);
        assert_eq!(event.body["from"], "4915550001");
    }

    #[test]
    fn unknown_template_subtype_becomes_generic_notification() {
        let raw = RawEvent::new(
            "message",
            json!({"id": "n1", "type": "notification_template", "subtype": "security_code_change"}),
        );
        let MapOutcome::Mapped(event) = map(&raw, &actions()) else {
            panic!("expected mapped event");
        };
        assert_eq!(event.category, EventCategory::Notification);
        assert_eq!(event.body["subtype"], "security_code_change");
    }

    #[test]
    fn revocation_carries_revoker_and_target() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "n1",
                "type": "revoked",
                "participant": "4915550001@c.us",
                "target": "true_123-456@g.us_AA",
                "chat": "123-456@g.us",
            }),
        );
        let MapOutcome::Mapped(event) = map(&raw, &actions()) else {
            panic!("expected mapped event");
        };
        assert_eq!(event.category, EventCategory::Revocation);
        assert_eq!(event.body["revoked_by"], "4915550001");
        assert_eq!(event.body["target"], "true_123-456@g.us_AA");
    }

    #[test]
    fn group_action_codes_translate_and_recipients_normalize() {
        let raw = RawEvent::new(
            "message",
            json!({
                "id": "n1",
                "type": "gp2",
                "subtype": "add",
                "participant": "4915550001@c.us",
                "chat": "123-456@g.us",
                "recipients": ["4915550002@c.us", "4915550003@s.whatsapp.net"],
            }),
        );
        let MapOutcome::Mapped(event) = map(&raw, &actions()) else {
            panic!("expected mapped event");
        };
        assert_eq!(event.category, EventCategory::GroupAction);
        assert_eq!(event.body["action"], "join");
        assert_eq!(event.body["by"], "4915550001");
        assert_eq!(
            event.body["recipients"],
            json!(["4915550002", "4915550003"])
        );
    }

    #[test]
    fn unknown_action_codes_pass_through() {
        let raw = RawEvent::new(
            "message",
            json!({"id": "n1", "type": "gp2", "subtype": "announce_toggle"}),
        );
        let MapOutcome::Mapped(event) = map(&raw, &actions()) else {
            panic!("expected mapped event");
        };
        assert_eq!(event.body["action"], "announce_toggle");
    }

    #[test]
    fn declines_plain_messages() {
        let raw = RawEvent::new("message", json!({"id": "m1", "type": "chat"}));
        assert!(matches!(map(&raw, &actions()), MapOutcome::Decline));
    }
}
