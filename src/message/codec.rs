//! Wire encoding for notification messages.
//!
//! Messages travel as self-describing JSON objects keyed by field name, so
//! readers skip fields they do not know and writers leave zero values out.
//! The legacy "update" signal is a plain text line rather than JSON.

use super::Message;
use crate::error::{Result, WatcherError};

/// Fixed text in front of every legacy ping.
pub const PING_PREFIX: &str = "Casbin policy has a new version";

const PING_SEPARATOR: &str = " from ";

/// Encode a message for publishing.
///
/// # Errors
///
/// Returns [`WatcherError::EncodeError`] if the message cannot be represented.
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| WatcherError::EncodeError(e.to_string()))
}

/// Decode a message received from the bus.
///
/// # Errors
///
/// Returns [`WatcherError::DecodeError`] for malformed or truncated input,
/// including input that lacks the `method` field.
///
/// # Examples
///
/// ```rust
/// use policy_watcher::message::{codec, UpdateType};
///
/// let msg = codec::decode(br#"{"method":"UpdateForSavePolicy","id":"n1","extra":true}"#).unwrap();
/// assert_eq!(msg.method, UpdateType::SavePolicy);
/// assert!(codec::decode(br#"{"method":"UpdateForSave"#).is_err());
/// ```
pub fn decode(data: &[u8]) -> Result<Message> {
    serde_json::from_slice(data).map_err(|e| WatcherError::DecodeError(e.to_string()))
}

/// Text published by the legacy `update()` signal.
pub fn ping_payload(origin: &str) -> String {
    format!("{PING_PREFIX}{PING_SEPARATOR}{origin}")
}

/// Origin id carried by a legacy ping, or `None` if `data` is not one.
pub fn parse_ping(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data).ok()?;
    text.strip_prefix(PING_PREFIX)?.strip_prefix(PING_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UpdateType;
    use proptest::prelude::*;

    fn sample() -> Message {
        Message::update_policies(
            "origin-1",
            "p",
            "p",
            vec![vec!["alice".into(), "data1".into(), "read".into()]],
            vec![
                vec!["bob".into(), "data2".into(), "write".into()],
                vec!["carol".into(), "data3".into(), "read".into()],
            ],
        )
    }

    #[test]
    fn test_round_trip() {
        let msg = sample();
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_zero_fields_omitted() {
        let bytes = encode(&Message::save_policy("n1")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"method":"UpdateForSavePolicy","id":"n1"}"#);
    }

    #[test]
    fn test_camel_case_field_names() {
        let msg = Message::remove_filtered_policy("n1", "p", "p", 1, vec!["read".into()]);
        let text = String::from_utf8(encode(&msg).unwrap()).unwrap();
        assert!(text.contains(r#""fieldIndex":1"#));
        assert!(text.contains(r#""fieldValues":["read"]"#));
    }

    #[test]
    fn test_accepts_nulls_and_unknown_fields() {
        let data = br#"{
            "method": "UpdateForAddPolicy",
            "id": "java-node",
            "sec": "alice",
            "ptype": "data1",
            "oldRule": null,
            "oldRules": null,
            "newRule": ["read"],
            "newRules": null,
            "fieldIndex": 0,
            "fieldValues": null,
            "someFutureField": {"nested": [1, 2, 3]}
        }"#;
        let msg = decode(data).unwrap();
        assert_eq!(msg.method, UpdateType::AddPolicy);
        assert_eq!(msg.sec, "alice");
        assert_eq!(msg.new_rule, vec!["read"]);
        assert!(msg.old_rules.is_empty());
    }

    #[test]
    fn test_accepts_short_kind_names() {
        let msg = decode(br#"{"method":"RemovePolicies"}"#).unwrap();
        assert_eq!(msg.method, UpdateType::RemovePolicies);
    }

    #[test]
    fn test_missing_method_is_decode_error() {
        let err = decode(br#"{"id":"n1"}"#).unwrap_err();
        assert!(matches!(err, WatcherError::DecodeError(_)));
    }

    #[test]
    fn test_unknown_method_is_decode_error() {
        assert!(decode(br#"{"method":"UpdateForDropTable"}"#).is_err());
    }

    #[test]
    fn test_every_truncation_fails() {
        let bytes = encode(&sample()).unwrap();
        for len in 0..bytes.len() {
            let err = decode(&bytes[..len]).unwrap_err();
            assert!(matches!(err, WatcherError::DecodeError(_)), "prefix of {len} bytes");
        }
    }

    #[test]
    fn test_ping_payload() {
        let payload = ping_payload("abc-123");
        assert_eq!(payload, "Casbin policy has a new version from abc-123");
        assert_eq!(parse_ping(payload.as_bytes()), Some("abc-123"));
        assert_eq!(parse_ping(b"{\"method\":\"Update\"}"), None);
        assert_eq!(parse_ping(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_ping_is_not_a_message() {
        assert!(decode(ping_payload("x").as_bytes()).is_err());
    }

    fn arb_rule() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z0-9_]{0,8}", 0..4)
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (
            prop::sample::select(UpdateType::ALL.to_vec()),
            "[a-f0-9-]{0,12}",
            "[a-z]{0,3}",
            "[a-z0-9]{0,3}",
            arb_rule(),
            prop::collection::vec(arb_rule(), 0..3),
            arb_rule(),
            prop::collection::vec(arb_rule(), 0..3),
            any::<i32>(),
            arb_rule(),
        )
            .prop_map(
                |(method, id, sec, ptype, old_rule, old_rules, new_rule, new_rules, field_index, field_values)| {
                    Message {
                        method,
                        id,
                        sec,
                        ptype,
                        old_rule,
                        old_rules,
                        new_rule,
                        new_rules,
                        field_index,
                        field_values,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_round_trip(msg in arb_message()) {
            let decoded = decode(&encode(&msg).unwrap()).unwrap();
            prop_assert_eq!(decoded, msg);
        }

        #[test]
        fn prop_mutated_input_never_panics(
            msg in arb_message(),
            index in any::<prop::sample::Index>(),
            byte in any::<u8>(),
        ) {
            let mut bytes = encode(&msg).unwrap();
            let at = index.index(bytes.len());
            bytes[at] = byte;
            // Either outcome is fine; only a panic would fail the property.
            let _ = decode(&bytes);
        }

        #[test]
        fn prop_truncated_input_fails(msg in arb_message(), index in any::<prop::sample::Index>()) {
            let bytes = encode(&msg).unwrap();
            let cut = index.index(bytes.len());
            prop_assert!(matches!(decode(&bytes[..cut]), Err(WatcherError::DecodeError(_))));
        }
    }
}
