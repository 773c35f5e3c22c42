use sha2::{Digest, Sha256};

use crate::chat::ChannelMessage;

/// Joins `parts` with `|` and returns the hex SHA-256 of the result.
#[must_use]
pub fn build_cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of an ordered message set. Depends only on each message's id
/// and last-modified time, so it changes exactly when a message is added,
/// removed or edited.
///
/// Ids are length-prefixed so no choice of id bytes can make two different
/// message sets feed the hasher the same stream.
#[must_use]
pub fn hash_messages(messages: &[ChannelMessage]) -> String {
    let mut hasher = Sha256::new();
    for msg in messages {
        hasher.update((msg.id.len() as u64).to_be_bytes());
        hasher.update(msg.id.as_bytes());
        hasher.update(msg.updated_at.timestamp_millis().to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn msg(id: &str) -> ChannelMessage {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        ChannelMessage {
            id: id.to_string(),
            author_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            root_id: None,
            text: "hello".to_string(),
            created_at: at,
            updated_at: at,
            deleted: false,
            is_system: false,
            attachment_count: 0,
        }
    }

    #[test]
    fn test_cache_key_is_deterministic_hex() {
        let a = build_cache_key(&["thread", "C1", "P1"]);
        assert_eq!(a, build_cache_key(&["thread", "C1", "P1"]));
        assert_eq!(a.len(), 64);
        assert_ne!(a, build_cache_key(&["channel", "C1", "P1"]));
    }

    #[test]
    fn test_hash_ignores_text_but_tracks_edits() {
        let base = vec![msg("a"), msg("b")];
        let mut retexted = base.clone();
        retexted[0].text = "different".to_string();
        assert_eq!(hash_messages(&base), hash_messages(&retexted));

        let mut edited = base.clone();
        edited[1].updated_at += TimeDelta::seconds(1);
        assert_ne!(hash_messages(&base), hash_messages(&edited));

        let mut grown = base.clone();
        grown.push(msg("c"));
        assert_ne!(hash_messages(&base), hash_messages(&grown));
    }

    #[test]
    fn test_hash_separators_inside_ids_do_not_collide() {
        let epoch = Utc.timestamp_millis_opt(0).unwrap();
        let two = vec![
            ChannelMessage {
                updated_at: epoch + TimeDelta::milliseconds(1),
                ..msg("a")
            },
            msg("b"),
        ];
        let one = vec![msg("a:1;b")];
        assert_ne!(hash_messages(&two), hash_messages(&one));

        let split = vec![msg("ab"), msg("c")];
        let shifted = vec![msg("a"), msg("bc")];
        assert_ne!(hash_messages(&split), hash_messages(&shifted));
    }
}
