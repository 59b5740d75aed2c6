//! Cursor broadcaster: throttled outbound pointer positions.
//!
//! DESIGN
//! ======
//! Pointer samples are converted to viewport percentages so they mean the
//! same thing on every screen size. A drop-style throttle gates sends: if
//! the last send was less than `throttle` ago the sample is discarded, not
//! queued. Only the freshest position matters for a cursor display.
//!
//! The throttle runs on a monotonic clock. Wall-clock epoch ms only stamps
//! `lastSeen`, so a stepped system clock cannot stall outbound cursors.
//!
//! Scroll input runs on its own cadence: a section change produces a new
//! presence meta for `track` immediately, independent of pointer traffic.
//! A section counts as tracked only once the caller confirms the `track`.

use std::time::Duration;

use tokio::time::Instant;

use crate::frame::{CursorState, PresenceMeta, Section};
use crate::identity::Identity;

/// Visible viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Convert a pixel position to `(x, y)` percentages in `[0, 100]`.
    /// `None` for a degenerate viewport or non-finite input.
    #[must_use]
    pub fn to_percent(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if !usable(self.width) || !usable(self.height) || !px.is_finite() || !py.is_finite() {
            return None;
        }
        let x = (px / self.width * 100.0).clamp(0.0, 100.0);
        let y = (py / self.height * 100.0).clamp(0.0, 100.0);
        Some((x, y))
    }
}

pub struct CursorBroadcaster {
    id: String,
    color: String,
    throttle: Duration,
    last_sent: Option<Instant>,
    section: Section,
    tracked: Option<Section>,
    online_at: String,
}

impl CursorBroadcaster {
    pub fn new(identity: &Identity, throttle: Duration, section: Section, online_at: impl Into<String>) -> Self {
        Self {
            id: identity.visitor_id.clone(),
            color: identity.color.clone(),
            throttle,
            last_sent: None,
            section,
            tracked: None,
            online_at: online_at.into(),
        }
    }

    #[must_use]
    pub fn section(&self) -> Section {
        self.section
    }

    /// Sample a pointer move at monotonic time `at`, stamping `lastSeen`
    /// with the epoch-ms `now`. Returns the payload to publish, or `None` if
    /// the sample is dropped by the throttle or cannot be normalized.
    pub fn on_pointer_move(&mut self, px: f64, py: f64, viewport: Viewport, at: Instant, now: i64) -> Option<CursorState> {
        let (x, y) = viewport.to_percent(px, py)?;
        if let Some(last) = self.last_sent {
            if at.saturating_duration_since(last) < self.throttle {
                return None;
            }
        }
        self.last_sent = Some(at);
        Some(CursorState { id: self.id.clone(), x, y, section: self.section, color: self.color.clone(), last_seen: now })
    }

    /// Metadata announcing the current section.
    #[must_use]
    pub fn presence_meta(&self) -> PresenceMeta {
        PresenceMeta::new(self.online_at.clone(), self.section)
    }

    /// Record a scroll into `section`. Returns fresh metadata to re-`track`
    /// while `section` differs from the last confirmed one.
    pub fn on_scroll(&mut self, section: Section) -> Option<PresenceMeta> {
        self.section = section;
        if self.tracked == Some(section) {
            return None;
        }
        Some(self.presence_meta())
    }

    /// Confirm that `track` for `section` went through.
    pub fn mark_tracked(&mut self, section: Section) {
        self.tracked = Some(section);
    }

    /// Forget what was last tracked, so the next scroll re-announces.
    /// Used after the channel drops.
    pub fn reset_tracking(&mut self) {
        self.tracked = None;
    }
}

#[cfg(test)]
#[path = "broadcaster_test.rs"]
mod tests;
