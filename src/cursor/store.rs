//! Cursor store: remote cursors keyed by visitor id.
//!
//! DESIGN
//! ======
//! The store is the only writer of remote cursor state. Ingest rules, in
//! order:
//! 1. Unparseable or invalid payloads are dropped.
//! 2. Our own id is ignored (no self-echo).
//! 3. A known id is overwritten, unless the payload is older than what we
//!    hold (`lastSeen` never goes backwards for an id).
//! 4. A new id at capacity evicts the entry with the smallest `lastSeen`.
//!
//! A periodic sweep deletes entries whose `now - lastSeen` exceeds the
//! staleness threshold. That covers peers whose tab died without a leave.
//!
//! TRADE-OFFS
//! ==========
//! `lastSeen` is the sender's clock. Large clock skew between peers makes
//! entries look older or younger than they are; acceptable for a cosmetic
//! display.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::frame::CursorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    SelfEcho,
    Malformed,
    OutOfOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    /// Inserted after evicting the named entry.
    Evicted(String),
    Ignored(IgnoreReason),
}

impl IngestOutcome {
    /// Whether the store contents changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

pub struct CursorStore {
    self_id: String,
    max_cursors: usize,
    stale_ms: i64,
    entries: HashMap<String, CursorState>,
}

impl CursorStore {
    pub fn new(self_id: impl Into<String>, max_cursors: usize, stale_after: Duration) -> Self {
        Self {
            self_id: self_id.into(),
            max_cursors: max_cursors.max(1),
            stale_ms: i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX),
            entries: HashMap::new(),
        }
    }

    /// Ingest a raw `cursor` broadcast payload.
    pub fn ingest_payload(&mut self, payload: &serde_json::Value) -> IngestOutcome {
        match serde_json::from_value::<CursorState>(payload.clone()) {
            Ok(cursor) => self.ingest(cursor),
            Err(e) => {
                debug!(error = %e, "cursor: malformed payload dropped");
                IngestOutcome::Ignored(IgnoreReason::Malformed)
            }
        }
    }

    /// Ingest a parsed cursor.
    pub fn ingest(&mut self, cursor: CursorState) -> IngestOutcome {
        if cursor.id == self.self_id {
            return IngestOutcome::Ignored(IgnoreReason::SelfEcho);
        }
        let Some(cursor) = sanitize(cursor) else {
            return IngestOutcome::Ignored(IgnoreReason::Malformed);
        };

        if let Some(existing) = self.entries.get_mut(&cursor.id) {
            if cursor.last_seen < existing.last_seen {
                trace!(id = %cursor.id, "cursor: out-of-order payload dropped");
                return IngestOutcome::Ignored(IgnoreReason::OutOfOrder);
            }
            *existing = cursor;
            return IngestOutcome::Updated;
        }

        let evicted = if self.entries.len() >= self.max_cursors { self.evict_oldest() } else { None };
        debug!(id = %cursor.id, evicted = ?evicted, "cursor: new peer");
        self.entries.insert(cursor.id.clone(), cursor);
        match evicted {
            Some(victim) => IngestOutcome::Evicted(victim),
            None => IngestOutcome::Inserted,
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let victim = self
            .entries
            .values()
            .min_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.id.cmp(&b.id)))
            .map(|c| c.id.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }

    /// Remove one entry. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }

    /// Delete every entry older than the staleness threshold. Returns the
    /// removed ids.
    pub fn sweep(&mut self, now: i64) -> Vec<String> {
        let stale_ms = self.stale_ms;
        let mut removed = Vec::new();
        self.entries.retain(|id, cursor| {
            let keep = now.saturating_sub(cursor.last_seen) <= stale_ms;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "cursor: swept stale entries");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CursorState> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ordered by id for stable rendering.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CursorState> {
        let mut cursors: Vec<CursorState> = self.entries.values().cloned().collect();
        cursors.sort_by(|a, b| a.id.cmp(&b.id));
        cursors
    }
}

/// Validate and normalize a remote payload. Coordinates are clamped into
/// `[0, 100]` and the color canonicalized to lowercase `#rrggbb`.
fn sanitize(mut cursor: CursorState) -> Option<CursorState> {
    if cursor.id.trim().is_empty() || !cursor.x.is_finite() || !cursor.y.is_finite() {
        return None;
    }
    let (r, g, b) = parse_hex_rgb(&cursor.color)?;
    cursor.color = format!("#{r:02x}{g:02x}{b:02x}");
    cursor.x = cursor.x.clamp(0.0, 100.0);
    cursor.y = cursor.y.clamp(0.0, 100.0);
    Some(cursor)
}

/// Parse `#RGB` or `#RRGGBB` into RGB channels.
fn parse_hex_rgb(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some((r, g, b))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
