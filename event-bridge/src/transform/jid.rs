//! Raw identifier normalization. The web client addresses every party by a
//! jid-style string with a routing suffix; canonical numbers drop it.

/// The two contact-address suffix forms the client emits.
const CONTACT_SUFFIXES: &[&str] = &["@c.us", "@s.whatsapp.net"];

/// Suffix marking a group conversation.
const GROUP_SUFFIX: &str = "@g.us";

/// Address of the ephemeral status broadcast feed.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Strip the known contact-address suffixes from a raw identifier.
pub fn normalize(raw: &str) -> String {
    for suffix in CONTACT_SUFFIXES {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    raw.to_string()
}

/// Whether a remote-conversation identifier is group-scoped.
pub fn is_group(raw: &str) -> bool {
    raw.ends_with(GROUP_SUFFIX)
}

/// Whether a remote identifier is the ephemeral status feed.
pub fn is_status_broadcast(raw: &str) -> bool {
    raw == STATUS_BROADCAST
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_both_contact_suffixes() {
        assert_eq!(normalize("4915550001@c.us"), "4915550001");
        assert_eq!(normalize("4915550001@s.whatsapp.net"), "4915550001");
    }

    #[test]
    fn leaves_other_identifiers_alone() {
        assert_eq!(normalize("123-456@g.us"), "123-456@g.us");
        assert_eq!(normalize("status@broadcast"), "status@broadcast");
        assert_eq!(normalize("4915550001"), "4915550001");
    }

    #[test]
    fn detects_group_conversations() {
        assert!(is_group("123-456@g.us"));
        assert!(!is_group("4915550001@c.us"));
    }
}
