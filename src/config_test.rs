use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_lookup_yields_defaults() {
    let cfg = PresenceConfig::from_lookup(lookup_from(&[]));
    assert_eq!(cfg, PresenceConfig::default());
    assert_eq!(cfg.topic, "live-presence");
    assert_eq!(cfg.throttle, Duration::from_millis(50));
    assert_eq!(cfg.stale_after, Duration::from_millis(5000));
    assert_eq!(cfg.sweep_every, Duration::from_millis(2000));
    assert_eq!(cfg.max_cursors, 10);
    assert_eq!(cfg.notice_for, Duration::from_millis(3000));
}

#[test]
fn overrides_are_parsed() {
    let cfg = PresenceConfig::from_lookup(lookup_from(&[
        ("PRESENCE_TOPIC", "staging-presence"),
        ("PRESENCE_THROTTLE_MS", "16"),
        ("PRESENCE_STALE_MS", " 750 "),
        ("PRESENCE_SWEEP_MS", "100"),
        ("PRESENCE_MAX_CURSORS", "3"),
        ("PRESENCE_NOTICE_MS", "250"),
    ]));
    assert_eq!(cfg.topic, "staging-presence");
    assert_eq!(cfg.throttle, Duration::from_millis(16));
    assert_eq!(cfg.stale_after, Duration::from_millis(750));
    assert_eq!(cfg.sweep_every, Duration::from_millis(100));
    assert_eq!(cfg.max_cursors, 3);
    assert_eq!(cfg.notice_for, Duration::from_millis(250));
}

#[test]
fn garbage_falls_back_to_defaults() {
    let cfg = PresenceConfig::from_lookup(lookup_from(&[
        ("PRESENCE_TOPIC", "   "),
        ("PRESENCE_THROTTLE_MS", "fast"),
        ("PRESENCE_MAX_CURSORS", "-4"),
    ]));
    assert_eq!(cfg.topic, DEFAULT_TOPIC);
    assert_eq!(cfg.throttle, Duration::from_millis(DEFAULT_THROTTLE_MS));
    assert_eq!(cfg.max_cursors, DEFAULT_MAX_CURSORS);
}

#[test]
fn zero_capacity_and_sweep_are_floored() {
    let cfg = PresenceConfig::from_lookup(lookup_from(&[("PRESENCE_MAX_CURSORS", "0"), ("PRESENCE_SWEEP_MS", "0")]));
    assert_eq!(cfg.max_cursors, 1);
    assert_eq!(cfg.sweep_every, Duration::from_millis(1));
}

#[test]
fn relay_listen_addr_joins_host_and_port() {
    let cfg = RelayConfig { bind_addr: DEFAULT_BIND_ADDR.into(), port: DEFAULT_PORT };
    assert_eq!(cfg.listen_addr(), "0.0.0.0:3000");

    let cfg = RelayConfig { bind_addr: "127.0.0.1".into(), port: 8088 };
    assert_eq!(cfg.listen_addr(), "127.0.0.1:8088");
}
