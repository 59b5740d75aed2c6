use super::*;
use crate::frame::PresenceState;

fn cursor_event() -> ChannelEvent {
    ChannelEvent::Broadcast { event: "cursor".into(), payload: serde_json::json!({}) }
}

#[test]
fn empty_bindings_accept_nothing() {
    let bindings = Bindings::new();
    assert!(!bindings.accepts(&cursor_event()));
    assert!(!bindings.accepts(&ChannelEvent::Sync(PresenceState::new())));
}

#[test]
fn named_broadcast_binding_is_exact() {
    let bindings = Bindings::new();
    bindings.add(Binding::Broadcast("cursor".into()));
    assert!(bindings.accepts(&cursor_event()));
    assert!(!bindings.accepts(&ChannelEvent::Broadcast { event: "chat".into(), payload: serde_json::Value::Null }));
}

#[test]
fn any_broadcast_accepts_every_name() {
    let bindings = Bindings::new();
    bindings.add(Binding::AnyBroadcast);
    assert!(bindings.accepts(&ChannelEvent::Broadcast { event: "chat".into(), payload: serde_json::Value::Null }));
    assert!(!bindings.accepts(&ChannelEvent::Leave { key: "v1".into() }));
}

#[test]
fn presence_bindings_are_per_kind() {
    let bindings = Bindings::new();
    bindings.add(Binding::Presence(PresenceEventKind::Leave));
    assert!(bindings.accepts(&ChannelEvent::Leave { key: "v1".into() }));
    assert!(!bindings.accepts(&ChannelEvent::Sync(PresenceState::new())));
}

#[test]
fn clones_share_registrations() {
    let bindings = Bindings::new();
    let delivery_side = bindings.clone();
    bindings.add(Binding::Presence(PresenceEventKind::Sync));
    assert!(delivery_side.accepts(&ChannelEvent::Sync(PresenceState::new())));
}
