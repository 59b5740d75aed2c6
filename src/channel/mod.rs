//! Channel: the publish/subscribe contract the presence core depends on.
//!
//! DESIGN
//! ======
//! The core never talks to a concrete backend. It subscribes through a
//! `Transport`, gets back a `ChannelHandle` for outbound operations and an
//! event receiver for inbound ones. A closed receiver means the transport
//! is gone.
//!
//! Guarantees assumed of every implementation:
//! - `track` is eventually reflected in other peers' `sync` snapshots.
//! - `send` is best-effort and unordered across peers; no self-echo.
//! - Only events matching a registered `Binding` are delivered.

pub mod memory;
pub mod ws;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::frame::{ChannelEvent, PresenceEventKind, PresenceMeta};

/// Per-subscription inbound queue depth.
pub const EVENT_BUFFER: usize = 256;

// =============================================================================
// BINDINGS
// =============================================================================

/// An event class a handle wants delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    Presence(PresenceEventKind),
    Broadcast(String),
    AnyBroadcast,
}

/// Registered bindings for one subscription. Shared between the handle
/// (which registers) and the delivery side (which filters).
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    inner: Arc<RwLock<HashSet<Binding>>>,
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, binding: Binding) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.insert(binding);
    }

    /// Whether `event` should be delivered under the current bindings.
    #[must_use]
    pub fn accepts(&self, event: &ChannelEvent) -> bool {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match event {
            ChannelEvent::Broadcast { event, .. } => {
                inner.contains(&Binding::AnyBroadcast) || inner.contains(&Binding::Broadcast(event.clone()))
            }
            other => other
                .presence_kind()
                .is_some_and(|kind| inner.contains(&Binding::Presence(kind))),
        }
    }
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Outbound half of a subscription.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Register interest in an event class.
    fn on(&mut self, binding: Binding);

    /// Announce (or re-announce) this client's presence metadata.
    async fn track(&self, meta: PresenceMeta) -> Result<(), ChannelError>;

    /// Retract this client's presence.
    async fn untrack(&self) -> Result<(), ChannelError>;

    /// Best-effort broadcast to every other subscriber.
    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError>;

    /// Release the subscription. Calling it again is a no-op.
    async fn unsubscribe(&mut self) -> Result<(), ChannelError>;
}

/// A live subscription: outbound handle plus inbound events.
pub struct Subscription {
    pub handle: Box<dyn ChannelHandle>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Entry point: subscribes to a named topic under a presence key.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, ChannelError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
