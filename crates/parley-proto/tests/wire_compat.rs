//! Wire compatibility checks against hand-written frames, the way a browser
//! client would produce them.

use parley_proto::{
    decode_client_frame, decode_server_event, encode_server_event, ClientEvent, ContentKind,
    ConversationId, ConversationKind, IdentitySet, Message, MessageId, Reactions, ServerEvent,
    UnreadCounts,
};

const CONV: &str = "6f1c2b0e-8d4a-4f7e-9a51-3c2d1e0f9b8a";
const MSG: &str = "0b7e9f3a-1c2d-4e5f-8a9b-c0d1e2f3a4b5";

#[test]
fn send_message_with_media() {
    let raw = format!(
        r#"{{"event":"send_message","ack":12,"data":{{"conversation_id":"{CONV}","body":{{"content_kind":"image","media_url":"blob://abc","file_name":"cat.png","file_size":2048}}}}}}"#
    );
    let frame = decode_client_frame(&raw).expect("decodes");
    assert_eq!(frame.ack, Some(12));
    match frame.event {
        ClientEvent::SendMessage {
            conversation_id,
            body,
        } => {
            assert_eq!(conversation_id.to_string(), CONV);
            assert_eq!(body.content_kind, ContentKind::Image);
            assert!(body.text.is_empty());
            assert_eq!(body.media_url.as_deref(), Some("blob://abc"));
            assert_eq!(body.file_size, Some(2048));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn create_group_conversation() {
    let raw = r#"{"event":"create_conversation","data":{"kind":"group","participants":["bob","carol"],"name":"Ops"}}"#;
    let frame = decode_client_frame(raw).expect("decodes");
    assert_eq!(
        frame.event,
        ClientEvent::CreateConversation {
            kind: ConversationKind::Group,
            participants: vec!["bob".into(), "carol".into()],
            name: Some("Ops".into()),
        }
    );
}

#[test]
fn react_without_glyph_defaults_to_none() {
    let raw = format!(r#"{{"event":"react","data":{{"message_id":"{MSG}","kind":"remove"}}}}"#);
    let frame = decode_client_frame(&raw).expect("decodes");
    assert!(matches!(frame.event, ClientEvent::React { glyph: None, ref kind, .. } if kind == "remove"));
}

#[test]
fn webrtc_payload_is_opaque() {
    let raw = format!(
        r#"{{"event":"webrtc_signal","data":{{"conversation_id":"{CONV}","payload":{{"type":"candidate","candidate":"a=1","nested":[1,2,{{"x":null}}]}}}}}}"#
    );
    let frame = decode_client_frame(&raw).expect("decodes");
    let ClientEvent::WebrtcSignal { payload, .. } = frame.event else {
        panic!("wrong variant");
    };
    assert_eq!(payload["nested"][2]["x"], serde_json::Value::Null);
    assert_eq!(payload["type"], "candidate");
}

#[test]
fn new_message_event_carries_full_message() {
    let conversation_id: ConversationId = CONV.parse().unwrap();
    let message = Message {
        id: MessageId::new(),
        conversation_id,
        sender: "alice".into(),
        text: "hi".into(),
        content_kind: ContentKind::Text,
        media_url: None,
        file_name: None,
        file_size: None,
        duration: None,
        reply_to: None,
        forward: None,
        reactions: Reactions::new(),
        read_by: IdentitySet::new(),
        delivered_to: ["bob"].into_iter().collect(),
        created_at: chrono::Utc::now(),
        edited_at: None,
        deleted_at: None,
    };
    let text = encode_server_event(&ServerEvent::NewMessage(message.clone())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["event"], "new_message");
    assert_eq!(value["data"]["text"], "hi");
    assert_eq!(value["data"]["delivered_to"], serde_json::json!(["bob"]));
    assert_eq!(decode_server_event(&text).unwrap(), ServerEvent::NewMessage(message));
}

#[test]
fn unread_counts_serialize_as_plain_map() {
    let mut counts = UnreadCounts::new();
    counts.set("bob", 3);
    let ev = ServerEvent::UnreadCountsUpdated {
        conversation_id: CONV.parse().unwrap(),
        unread_counts: counts,
    };
    let value: serde_json::Value =
        serde_json::from_str(&encode_server_event(&ev).unwrap()).unwrap();
    assert_eq!(value["data"]["unread_counts"]["bob"], 3);
}
