use super::*;
use serde_json::json;

#[test]
fn request_sets_fields() {
    let frame = Frame::request(SYSCALL_SUBSCRIBE, Data::new());
    assert_eq!(frame.syscall, "channel:subscribe");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.topic.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn reply_inherits_topic_and_syscall() {
    let req = Frame::request(SYSCALL_TRACK, Data::new()).with_topic("live-presence");
    let done = req.done();

    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.topic.as_deref(), Some("live-presence"));
    assert_eq!(done.syscall, SYSCALL_TRACK);
    assert_eq!(done.status, Status::Done);
}

#[test]
fn prefix_and_op_extraction() {
    let frame = Frame::request("broadcast:cursor", Data::new());
    assert_eq!(frame.prefix(), "broadcast");
    assert_eq!(frame.op(), "cursor");

    let frame = Frame::request("noseparator", Data::new());
    assert_eq!(frame.prefix(), "noseparator");
    assert_eq!(frame.op(), "");
}

#[test]
fn error_from_typed_carries_code() {
    let req = Frame::request(SYSCALL_SUBSCRIBE, Data::new());
    let err = req.error_from(&crate::error::ChannelError::Timeout);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.data_str(FRAME_CODE), Some("E_TIMEOUT"));
    assert_eq!(err.data.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(true));
}

#[test]
fn section_parses_known_names_only() {
    assert_eq!("projects".parse::<Section>(), Ok(Section::Projects));
    assert!("footer".parse::<Section>().is_err());
    assert_eq!(Section::Contact.to_string(), "contact");
}

#[test]
fn cursor_state_uses_camel_case_last_seen() {
    let cursor = CursorState {
        id: "v1".into(),
        x: 50.0,
        y: 25.5,
        section: Section::Hero,
        color: "#22c55e".into(),
        last_seen: 1_700_000_000_000,
    };
    let value = serde_json::to_value(&cursor).expect("serialize");
    assert_eq!(value["lastSeen"], json!(1_700_000_000_000_i64));
    assert_eq!(value["section"], json!("hero"));
}

#[test]
fn sync_event_survives_frame_translation() {
    let mut state = PresenceState::new();
    state.insert("v1".into(), vec![PresenceMeta::new("2026-01-01T00:00:00Z", Section::About)]);
    let event = ChannelEvent::Sync(state);

    let frame = event.to_frame("live-presence");
    assert_eq!(frame.syscall, SYSCALL_SYNC);
    assert_eq!(ChannelEvent::from_frame(&frame), Some(event));
}

#[test]
fn broadcast_event_uses_event_name_as_op() {
    let event = ChannelEvent::Broadcast { event: "cursor".into(), payload: json!({"id": "v1"}) };
    let frame = event.to_frame("live-presence");
    assert_eq!(frame.syscall, "broadcast:cursor");
    assert_eq!(ChannelEvent::from_frame(&frame), Some(event));
}

#[test]
fn from_frame_rejects_replies_and_garbage() {
    let req = Frame::request(SYSCALL_SEND, Data::new());
    assert_eq!(ChannelEvent::from_frame(&req.done()), None);

    let bad_join = Frame::request(SYSCALL_JOIN, Data::new()).with_data("key", 7);
    assert_eq!(ChannelEvent::from_frame(&bad_join), None);

    let bad_sync = Frame::request(SYSCALL_SYNC, Data::new()).with_data("state", "nope");
    assert_eq!(ChannelEvent::from_frame(&bad_sync), None);

    let unknown = Frame::request("board:join", Data::new());
    assert_eq!(ChannelEvent::from_frame(&unknown), None);
}

#[test]
fn now_iso8601_is_rfc3339() {
    let stamp = now_iso8601();
    assert!(stamp.contains('T'));
    assert!(stamp.ends_with('Z'));
}
