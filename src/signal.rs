//! Signaling wire schema shared with the relay layer.
//!
//! Every out-of-band negotiation message travels in one JSON envelope:
//! `{to, from, type, payload, prefix, roomType, broadcaster}`.
//!
//! Message types:
//!   - "offer" / "answer"  — session description halves of the handshake
//!   - "candidate"         — trickled ICE candidate (null payload marks
//!     end-of-candidates)
//!   - "data"              — application payload relayed over signaling
//!   - "speaking" / "stopped_speaking" — voice-activity notifications,
//!     keyed by `from` (may be relayed on behalf of a third party)
//!
//! Payloads stay opaque `serde_json::Value`: this core never parses SDP
//! or candidate attributes. Unknown *types* are not a parse error — the
//! session decides how to route them (and drops unrecognized ones).

use serde::{Deserialize, Serialize};

// ── Message type strings ────────────────────────────────────

pub const OFFER: &str = "offer";
pub const ANSWER: &str = "answer";
pub const CANDIDATE: &str = "candidate";
pub const DATA: &str = "data";
pub const SPEAKING: &str = "speaking";
pub const STOPPED_SPEAKING: &str = "stopped_speaking";

/// Message types this core understands. Anything else is relayed to the
/// forward-compatibility no-op path, never rejected.
pub const KNOWN_KINDS: &[&str] = &[OFFER, ANSWER, CANDIDATE, DATA, SPEAKING, STOPPED_SPEAKING];

/// Returns `true` if `kind` is a message type this core acts on.
pub fn is_known_kind(kind: &str) -> bool {
    KNOWN_KINDS.contains(&kind)
}

// ── Wire envelope ───────────────────────────────────────────

/// One signaling message: `{to, from, type, payload, prefix, roomType,
/// broadcaster}`.
///
/// `to` is set on outbound messages (target peer id) and may be absent
/// on inbound ones (the relay already routed them). `from` is present
/// only on multi-party relayed messages. Absent optional fields are
/// omitted from the serialized JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(rename = "roomType", default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcaster: Option<bool>,
}

// ── Parse / encode helpers ──────────────────────────────────

/// Parse a signaling envelope from a `serde_json::Value`.
pub fn parse_signal(value: &serde_json::Value) -> Result<SignalMessage, String> {
    serde_json::from_value(value.clone()).map_err(|e| format!("signal parse error: {e}"))
}

/// Parse a signaling envelope from raw bytes.
pub fn parse_signal_bytes(bytes: &[u8]) -> Result<SignalMessage, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("signal parse error: {e}"))
}

/// Encode a signaling envelope to JSON bytes (ready for the relay).
pub fn encode_signal(message: &SignalMessage) -> Result<Vec<u8>, String> {
    serde_json::to_vec(message).map_err(|e| format!("signal encode error: {e}"))
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_cover_protocol() {
        assert!(is_known_kind("offer"));
        assert!(is_known_kind("answer"));
        assert!(is_known_kind("candidate"));
        assert!(is_known_kind("data"));
        assert!(is_known_kind("speaking"));
        assert!(is_known_kind("stopped_speaking"));
        assert!(!is_known_kind("file-chunk"));
        assert!(!is_known_kind(""));
    }

    #[test]
    fn outbound_serialization_matches_schema() {
        let message = SignalMessage {
            to: Some("peer-b".to_string()),
            from: None,
            kind: OFFER.to_string(),
            payload: Some(serde_json::json!({"sdp": "v=0\r\ntest sdp"})),
            prefix: Some("webkit".to_string()),
            room_type: Some("video".to_string()),
            broadcaster: None,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&encode_signal(&message).unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["to"], "peer-b");
        assert_eq!(obj["type"], "offer");
        assert_eq!(obj["payload"]["sdp"], "v=0\r\ntest sdp");
        assert_eq!(obj["prefix"], "webkit");
        assert_eq!(obj["roomType"], "video");
        // Absent optionals are omitted entirely, not serialized as null.
        assert!(!obj.contains_key("from"));
        assert!(!obj.contains_key("broadcaster"));
    }

    #[test]
    fn parse_realistic_inbound_offer() {
        let json = serde_json::json!({
            "type": "offer",
            "payload": {"type": "offer", "sdp": "v=0\r\no=- 123456 2 IN IP4 127.0.0.1\r\n"},
            "prefix": "moz",
            "roomType": "data"
        });
        let message = parse_signal(&json).unwrap();
        assert_eq!(message.kind, "offer");
        assert_eq!(message.prefix.as_deref(), Some("moz"));
        assert!(message.to.is_none());
        assert!(message.payload.is_some());
    }

    #[test]
    fn parse_relayed_speaking_message() {
        let json = serde_json::json!({
            "type": "speaking",
            "from": "peer42"
        });
        let message = parse_signal(&json).unwrap();
        assert_eq!(message.kind, "speaking");
        assert_eq!(message.from.as_deref(), Some("peer42"));
        assert!(message.payload.is_none());
    }

    #[test]
    fn null_payload_parses_as_absent() {
        // End-of-candidates sentinel: {"type":"candidate","payload":null}.
        let json = serde_json::json!({"type": "candidate", "payload": null});
        let message = parse_signal(&json).unwrap();
        assert_eq!(message.kind, "candidate");
        assert!(message.payload.is_none());
    }

    #[test]
    fn unknown_type_is_not_a_parse_error() {
        let json = serde_json::json!({"type": "connection_request", "payload": {}});
        let message = parse_signal(&json).unwrap();
        assert_eq!(message.kind, "connection_request");
        assert!(!is_known_kind(&message.kind));
    }

    #[test]
    fn missing_type_is_a_parse_error() {
        let json = serde_json::json!({"payload": {}});
        let result = parse_signal(&json);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("signal parse error"));
    }

    #[test]
    fn bytes_roundtrip() {
        let message = SignalMessage {
            to: Some("peer-a".to_string()),
            from: Some("peer-b".to_string()),
            kind: CANDIDATE.to_string(),
            payload: Some(serde_json::json!({
                "candidate": "candidate:1 1 UDP 2130706431 192.168.1.1 12345 typ host",
                "sdpMid": "0"
            })),
            prefix: None,
            room_type: Some("data".to_string()),
            broadcaster: Some(true),
        };
        let bytes = encode_signal(&message).unwrap();
        let decoded = parse_signal_bytes(&bytes).unwrap();
        assert_eq!(decoded, message);
    }
}
