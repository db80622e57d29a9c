//! JSON frame codec.
//!
//! Client frames carry an optional `ack` id next to the tagged event:
//!
//! ```text
//! {"event": "send_message", "ack": 7, "data": {...}}
//! ```
//!
//! Decoding happens in two steps so that an unknown event name is reported as
//! [`ProtoError::UnknownEvent`] rather than as a generic schema failure.

use crate::error::{ProtoError, Result};
use crate::event::{ClientEvent, ServerEvent};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    /// Ack id to echo back, if the client wants a reply.
    pub ack: Option<u64>,
    /// The request.
    pub event: ClientEvent,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    ack: Option<u64>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one client text frame.
pub fn decode_client_frame(text: &str) -> Result<ClientFrame> {
    let raw: RawFrame = serde_json::from_str(text).map_err(ProtoError::Malformed)?;

    if !ClientEvent::is_known(&raw.event) {
        return Err(ProtoError::UnknownEvent {
            event: raw.event,
            ack: raw.ack,
        });
    }

    let mut tagged = Map::with_capacity(2);
    tagged.insert("event".to_string(), Value::String(raw.event.clone()));
    if let Some(data) = raw.data.filter(|d| !d.is_null()) {
        tagged.insert("data".to_string(), data);
    }

    let event = serde_json::from_value::<ClientEvent>(Value::Object(tagged)).map_err(|e| {
        ProtoError::InvalidPayload {
            event: raw.event,
            ack: raw.ack,
            reason: e.to_string(),
        }
    })?;

    Ok(ClientFrame {
        ack: raw.ack,
        event,
    })
}

/// Encode a client frame (used by clients and test harnesses).
pub fn encode_client_frame(frame: &ClientFrame) -> Result<String> {
    let mut value = serde_json::to_value(&frame.event).map_err(ProtoError::Encode)?;
    if let (Some(ack), Value::Object(map)) = (frame.ack, &mut value) {
        map.insert("ack".to_string(), Value::from(ack));
    }
    serde_json::to_string(&value).map_err(ProtoError::Encode)
}

/// Encode a server event as a text frame.
pub fn encode_server_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event).map_err(ProtoError::Encode)
}

/// Decode a server text frame (used by clients and test harnesses).
pub fn decode_server_event(text: &str) -> Result<ServerEvent> {
    serde_json::from_str(text).map_err(ProtoError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConversationId;

    #[test]
    fn unknown_event_is_rejected_by_name() {
        let err = decode_client_frame(r#"{"event":"self_destruct","ack":4,"data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownEvent { ref event, .. } if event == "self_destruct"));
        assert_eq!(err.event_name(), Some("self_destruct"));
        assert_eq!(err.ack(), Some(4));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = decode_client_frame("{not json").unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
        assert_eq!(err.ack(), None);
    }

    #[test]
    fn bad_ids_are_invalid_payloads() {
        let err =
            decode_client_frame(r#"{"event":"delete_message","data":{"message_id":"nope"}}"#)
                .unwrap_err();
        assert!(matches!(err, ProtoError::InvalidPayload { ref event, .. } if event == "delete_message"));
        assert_eq!(err.ack(), None);

        let err = decode_client_frame(r#"{"event":"mark_read","ack":12,"data":{"message_id":7}}"#)
            .unwrap_err();
        assert_eq!(err.event_name(), Some("mark_read"));
        assert_eq!(err.ack(), Some(12));
    }

    #[test]
    fn ping_needs_no_data() {
        let frame = decode_client_frame(r#"{"event":"ping","ack":3}"#).unwrap();
        assert_eq!(frame.event, ClientEvent::Ping);
        assert_eq!(frame.ack, Some(3));
    }

    #[test]
    fn client_frame_survives_encoding() {
        let frame = ClientFrame {
            ack: Some(9),
            event: ClientEvent::Typing {
                conversation_id: ConversationId::new(),
                is_typing: true,
            },
        };
        let text = encode_client_frame(&frame).unwrap();
        assert_eq!(decode_client_frame(&text).unwrap(), frame);
    }

    #[test]
    fn mark_read_accepts_either_scope() {
        let conv = ConversationId::new();
        let text = format!(r#"{{"event":"mark_read","data":{{"conversation_id":"{conv}"}}}}"#);
        let frame = decode_client_frame(&text).unwrap();
        assert_eq!(
            frame.event,
            ClientEvent::MarkRead {
                conversation_id: Some(conv),
                message_id: None
            }
        );
    }

    #[test]
    fn server_events_use_wire_names() {
        let text = encode_server_event(&ServerEvent::Pong).unwrap();
        assert_eq!(text, r#"{"event":"pong"}"#);

        let ev = ServerEvent::ConversationRemoved {
            conversation_id: ConversationId::new(),
        };
        let text = encode_server_event(&ev).unwrap();
        assert!(text.starts_with(r#"{"event":"conversation_removed""#));
        assert_eq!(decode_server_event(&text).unwrap(), ev);
    }

    #[test]
    fn every_known_name_matches_its_variant() {
        // Names must stay in sync with the serde tags.
        let conv = ConversationId::new();
        let sample = ClientEvent::WebrtcSignal {
            conversation_id: conv,
            payload: serde_json::json!({"sdp": "v=0"}),
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["event"], sample.name());
        assert!(ClientEvent::is_known(sample.name()));
        assert_eq!(ClientEvent::NAMES.len(), 20);
    }
}
