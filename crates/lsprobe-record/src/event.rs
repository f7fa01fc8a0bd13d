//! The recorded-event model.
use std::time::{SystemTime, UNIX_EPOCH};

use lsprobe_wire::{Direction, Message};

/// One observed protocol message, as persisted.
///
/// Append-only: events are created once, never mutated. Within a session
/// the sequence number is the sole ordering key; timestamps are advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// The session this event belongs to.
    pub session_id: String,
    /// Strictly increasing per-session sequence number.
    pub seq: u64,
    /// Whether the client sent or received the message.
    pub direction: Direction,
    /// Milliseconds since the Unix epoch when the event was observed.
    pub timestamp_ms: u64,
    /// The message itself.
    pub message: Message,
}

impl RecordedEvent {
    /// Build an event stamped with the current time.
    pub fn observed_now(
        session_id: impl Into<String>,
        seq: u64,
        direction: Direction,
        message: Message,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            direction,
            timestamp_ms: now_millis(),
            message,
        }
    }

    /// The message serialized as its JSON-RPC envelope.
    pub fn message_json(&self) -> String {
        self.message.to_json().to_string()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_now_stamps_time() {
        let before = now_millis();
        let event = RecordedEvent::observed_now(
            "s1",
            1,
            Direction::Sent,
            Message::notification("initialized", serde_json::json!({})),
        );
        assert!(event.timestamp_ms >= before);
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.seq, 1);
    }

    #[test]
    fn message_json_is_the_envelope() {
        let event = RecordedEvent::observed_now(
            "s1",
            1,
            Direction::Received,
            Message::response(4, serde_json::json!({"ok": true})),
        );
        let parsed: serde_json::Value = serde_json::from_str(&event.message_json()).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 4);
        assert_eq!(parsed["result"]["ok"], true);
    }
}
