//! Presence synchronizer: visitor count and connection state.
//!
//! DESIGN
//! ======
//! A small state machine fed one `ChannelEvent` at a time:
//!
//! ```text
//! Disconnected ──subscribe──▶ Subscribing ──first sync──▶ Synced
//!       ▲                          │                         │
//!       └──────── error / unsubscribe / stream end ──────────┘
//! ```
//!
//! The count is replaced wholesale from each `sync` snapshot, never
//! incremented, so join/leave races cannot make it drift. `join`/`leave`
//! only produce effects for the session driver: a notice for joins, a
//! cursor removal for leaves. Self is always filtered out.

use serde::Serialize;
use tracing::{debug, info};

use crate::frame::{ChannelEvent, PresenceState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Subscribing,
    Synced,
}

/// The query surface other UI elements consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub count: usize,
    pub is_connected: bool,
}

impl PresenceStatus {
    /// Solo mode: only self, not connected.
    #[must_use]
    pub fn solo() -> Self {
        Self { count: 1, is_connected: false }
    }
}

/// Side effects the driver applies to the other components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEffect {
    /// A remote visitor joined; show a transient notice.
    Joined(String),
    /// A remote visitor left; drop their cursor immediately.
    Left(String),
    /// The channel is gone; drop every remote cursor.
    ClearCursors,
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

pub struct PresenceSynchronizer {
    self_id: String,
    state: ConnectionState,
    count: usize,
    is_connected: bool,
}

impl PresenceSynchronizer {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self { self_id: self_id.into(), state: ConnectionState::Disconnected, count: 1, is_connected: false }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn status(&self) -> PresenceStatus {
        PresenceStatus { count: self.count, is_connected: self.is_connected }
    }

    /// A subscribe attempt is in flight.
    pub fn begin_subscribe(&mut self) {
        self.state = ConnectionState::Subscribing;
        debug!(self_id = %self.self_id, "presence: subscribing");
    }

    /// Subscribe failed, the transport dropped, or we unsubscribed.
    /// Degrades to solo mode.
    pub fn disconnect(&mut self) -> Vec<PresenceEffect> {
        let was = self.state;
        self.state = ConnectionState::Disconnected;
        self.count = 1;
        self.is_connected = false;
        if was != ConnectionState::Disconnected {
            info!(self_id = %self.self_id, from = ?was, "presence: disconnected");
        }
        vec![PresenceEffect::ClearCursors]
    }

    /// Ingest one channel event. Broadcasts are ignored here.
    pub fn handle_event(&mut self, event: &ChannelEvent) -> Vec<PresenceEffect> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }
        match event {
            ChannelEvent::Sync(snapshot) => {
                self.apply_sync(snapshot);
                Vec::new()
            }
            ChannelEvent::Join { key, .. } if *key != self.self_id => vec![PresenceEffect::Joined(key.clone())],
            ChannelEvent::Leave { key } if *key != self.self_id => vec![PresenceEffect::Left(key.clone())],
            _ => Vec::new(),
        }
    }

    fn apply_sync(&mut self, snapshot: &PresenceState) {
        self.count = snapshot.len().max(1);
        if self.state != ConnectionState::Synced {
            self.state = ConnectionState::Synced;
            self.is_connected = true;
            info!(self_id = %self.self_id, count = self.count, "presence: synced");
        } else {
            debug!(count = self.count, "presence: sync");
        }
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
