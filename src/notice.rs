//! Join notices: transient "someone joined" messages.
//!
//! Purely informational. Each notice clears itself after a fixed display
//! duration; a repeat join from the same visitor refreshes the timer
//! instead of stacking a duplicate.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNotice {
    pub visitor_id: String,
    /// Epoch ms after which the notice is gone.
    pub expires_at: i64,
}

pub struct Notices {
    display_ms: i64,
    active: Vec<JoinNotice>,
}

impl Notices {
    #[must_use]
    pub fn new(display_for: Duration) -> Self {
        Self { display_ms: i64::try_from(display_for.as_millis()).unwrap_or(i64::MAX), active: Vec::new() }
    }

    /// Raise a notice for `visitor_id`, visible until `now + display`.
    pub fn push(&mut self, visitor_id: &str, now: i64) {
        let expires_at = now.saturating_add(self.display_ms);
        if let Some(existing) = self.active.iter_mut().find(|n| n.visitor_id == visitor_id) {
            existing.expires_at = expires_at;
            return;
        }
        self.active.push(JoinNotice { visitor_id: visitor_id.to_string(), expires_at });
    }

    /// Drop notices whose time is up. Returns whether anything changed.
    pub fn expire(&mut self, now: i64) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.expires_at > now);
        self.active.len() != before
    }

    /// Earliest pending expiry, if any notice is showing.
    #[must_use]
    pub fn next_expiry(&self) -> Option<i64> {
        self.active.iter().map(|n| n.expires_at).min()
    }

    #[must_use]
    pub fn active(&self) -> &[JoinNotice] {
        &self.active
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
#[path = "notice_test.rs"]
mod tests;
