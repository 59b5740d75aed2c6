use super::*;

const DISPLAY: Duration = Duration::from_millis(3000);

#[test]
fn notice_is_visible_until_display_elapses() {
    let mut notices = Notices::new(DISPLAY);
    notices.push("v1", 1_000);

    assert!(!notices.expire(3_999));
    assert_eq!(notices.active().len(), 1);
    assert!(notices.expire(4_000));
    assert!(notices.active().is_empty());
}

#[test]
fn repeat_join_refreshes_instead_of_stacking() {
    let mut notices = Notices::new(DISPLAY);
    notices.push("v1", 0);
    notices.push("v1", 2_000);

    assert_eq!(notices.active().len(), 1);
    assert_eq!(notices.next_expiry(), Some(5_000));
    assert!(!notices.expire(3_500));
}

#[test]
fn next_expiry_tracks_earliest() {
    let mut notices = Notices::new(DISPLAY);
    assert_eq!(notices.next_expiry(), None);
    notices.push("v2", 500);
    notices.push("v1", 100);
    assert_eq!(notices.next_expiry(), Some(3_100));

    notices.expire(3_100);
    assert_eq!(notices.next_expiry(), Some(3_500));
    assert_eq!(notices.active()[0].visitor_id, "v2");
}

#[test]
fn clear_drops_everything() {
    let mut notices = Notices::new(DISPLAY);
    notices.push("v1", 0);
    notices.push("v2", 0);
    notices.clear();
    assert!(notices.active().is_empty());
}
