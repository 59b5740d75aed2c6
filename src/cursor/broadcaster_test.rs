use super::*;

const VIEWPORT: Viewport = Viewport { width: 1000.0, height: 500.0 };

fn broadcaster() -> CursorBroadcaster {
    let identity = Identity { visitor_id: "v1".into(), color: "#22c55e".into() };
    CursorBroadcaster::new(&identity, Duration::from_millis(50), Section::Hero, "2026-01-01T00:00:00Z")
}

// =============================================================================
// normalization
// =============================================================================

#[test]
fn pixels_become_viewport_percentages() {
    assert_eq!(VIEWPORT.to_percent(500.0, 250.0), Some((50.0, 50.0)));
    assert_eq!(VIEWPORT.to_percent(0.0, 500.0), Some((0.0, 100.0)));
}

#[test]
fn out_of_viewport_positions_are_clamped() {
    assert_eq!(VIEWPORT.to_percent(-20.0, 900.0), Some((0.0, 100.0)));
}

#[test]
fn degenerate_viewport_or_nan_yields_nothing() {
    assert_eq!(Viewport::new(0.0, 500.0).to_percent(1.0, 1.0), None);
    assert_eq!(Viewport::new(f64::NAN, 500.0).to_percent(1.0, 1.0), None);
    assert_eq!(VIEWPORT.to_percent(f64::INFINITY, 1.0), None);
}

// =============================================================================
// throttle
// =============================================================================

/// Monotonic instant `ms` after a fixed base, paired with an epoch stamp.
fn clock(ms: u64) -> (Instant, i64) {
    thread_local! {
        static BASE: Instant = Instant::now();
    }
    let at = BASE.with(|base| *base + Duration::from_millis(ms));
    (at, 1_700_000_000_000 + i64::try_from(ms).unwrap())
}

fn sample(b: &mut CursorBroadcaster, px: f64, py: f64, ms: u64) -> Option<CursorState> {
    let (at, now) = clock(ms);
    b.on_pointer_move(px, py, VIEWPORT, at, now)
}

#[test]
fn first_sample_is_sent_with_identity() {
    let mut b = broadcaster();
    let (at, _) = clock(0);
    let sent = b.on_pointer_move(500.0, 250.0, VIEWPORT, at, 10_000).expect("first sample sends");
    assert_eq!(sent.id, "v1");
    assert_eq!(sent.color, "#22c55e");
    assert_eq!(sent.section, Section::Hero);
    assert_eq!(sent.last_seen, 10_000);
    assert!((sent.x - 50.0).abs() < f64::EPSILON);
}

#[test]
fn burst_within_window_sends_at_most_once() {
    let mut b = broadcaster();
    let sent = (0..20u32)
        .filter_map(|i| sample(&mut b, f64::from(i), 10.0, u64::from(i) * 2))
        .count();
    assert_eq!(sent, 1);
}

#[test]
fn dropped_samples_are_not_queued() {
    let mut b = broadcaster();
    assert!(sample(&mut b, 0.0, 0.0, 0).is_some());
    // (10,90) lands inside the window and is discarded outright.
    assert!(sample(&mut b, 100.0, 450.0, 40).is_none());
    // (11,89) is the next sample after the window: it, not (10,90), goes out.
    let sent = sample(&mut b, 110.0, 445.0, 55).expect("window elapsed");
    assert!((sent.x - 11.0).abs() < 1e-9);
    assert!((sent.y - 89.0).abs() < 1e-9);
}

#[test]
fn dropped_sample_does_not_reset_window() {
    let mut b = broadcaster();
    assert!(sample(&mut b, 0.0, 0.0, 0).is_some());
    assert!(sample(&mut b, 0.0, 0.0, 49).is_none());
    assert!(sample(&mut b, 0.0, 0.0, 50).is_some());
}

#[test]
fn unnormalizable_sample_does_not_consume_window() {
    let mut b = broadcaster();
    assert!(sample(&mut b, f64::NAN, 0.0, 0).is_none());
    assert!(sample(&mut b, 1.0, 1.0, 1).is_some());
}

#[test]
fn wall_clock_stepping_back_does_not_stall_sends() {
    let mut b = broadcaster();
    let (start, _) = clock(0);
    assert!(b.on_pointer_move(1.0, 1.0, VIEWPORT, start, 1_000_000).is_some());

    // The wall clock jumps back 600s while monotonic time keeps moving.
    let sent: Vec<CursorState> = (1..=100u64)
        .filter_map(|i| {
            let (at, _) = clock(i * 100);
            b.on_pointer_move(1.0, 1.0, VIEWPORT, at, 400_000 + i64::try_from(i).unwrap() * 100)
        })
        .collect();
    assert_eq!(sent.len(), 100);
    assert_eq!(sent[0].last_seen, 400_100);
}

// =============================================================================
// scroll
// =============================================================================

#[test]
fn scroll_retracks_only_on_section_change() {
    let mut b = broadcaster();
    let initial = b.presence_meta();
    assert_eq!(initial.section, "hero");
    b.mark_tracked(Section::Hero);

    assert!(b.on_scroll(Section::Hero).is_none());
    let meta = b.on_scroll(Section::Skills).expect("section changed");
    assert_eq!(meta.section, "skills");
    assert_eq!(meta.online_at, "2026-01-01T00:00:00Z");
    b.mark_tracked(Section::Skills);
    assert!(b.on_scroll(Section::Skills).is_none());
}

#[test]
fn unconfirmed_track_is_offered_again() {
    let mut b = broadcaster();
    b.mark_tracked(Section::Hero);

    assert!(b.on_scroll(Section::Projects).is_some());
    // The track never confirmed, so the same section is still pending.
    let retry = b.on_scroll(Section::Projects).expect("retried");
    assert_eq!(retry.section, "projects");

    b.mark_tracked(Section::Projects);
    assert!(b.on_scroll(Section::Projects).is_none());
}

#[test]
fn scroll_updates_outgoing_cursor_section() {
    let mut b = broadcaster();
    b.on_scroll(Section::Contact);
    let sent = sample(&mut b, 1.0, 1.0, 0).expect("sends");
    assert_eq!(sent.section, Section::Contact);
}

#[test]
fn reset_tracking_forces_reannounce() {
    let mut b = broadcaster();
    b.mark_tracked(Section::Hero);
    b.reset_tracking();
    assert!(b.on_scroll(Section::Hero).is_some());
}
