//! In-process channel hub.
//!
//! DESIGN
//! ======
//! `LocalHub` keeps every topic in one `Mutex`-guarded map: the live
//! subscribers (each with an outgoing `mpsc::Sender`) and the presence
//! metadata tracked per subscription. Presence is keyed by the subscriber's
//! presence key, so several subscriptions under one key count once.
//!
//! - `join` fires when a key first appears, `leave` when its last meta goes.
//! - Every membership or metadata change is followed by a full `sync`.
//! - Delivery uses `try_send`: a subscriber with a full queue misses the
//!   event rather than stalling everyone else.
//!
//! The lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Binding, Bindings, ChannelHandle, EVENT_BUFFER, Subscription, Transport};
use crate::error::ChannelError;
use crate::frame::{ChannelEvent, PresenceMeta, PresenceState};

// =============================================================================
// HUB
// =============================================================================

/// Shared in-process pub/sub hub. Clone is cheap; all clones share state.
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    topics: HashMap<String, Topic>,
    next_id: u64,
    refuse: bool,
}

#[derive(Default)]
struct Topic {
    subscribers: HashMap<u64, Subscriber>,
    /// Tracked metadata per subscription: `sub_id` -> (key, meta).
    presences: HashMap<u64, (String, PresenceMeta)>,
}

struct Subscriber {
    key: String,
    tx: mpsc::Sender<ChannelEvent>,
    bindings: Bindings,
}

impl Topic {
    fn snapshot(&self) -> PresenceState {
        let mut state = PresenceState::new();
        for (key, meta) in self.presences.values() {
            state.entry(key.clone()).or_default().push(meta.clone());
        }
        state
    }

    fn has_key(&self, key: &str) -> bool {
        self.presences.values().any(|(k, _)| k == key)
    }

    fn deliver(&self, event: &ChannelEvent, exclude: Option<u64>) {
        for (sub_id, sub) in &self.subscribers {
            if exclude == Some(*sub_id) || !sub.bindings.accepts(event) {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.tx.try_send(event.clone()) {
                debug!(sub_id, key = %sub.key, "hub: subscriber queue full, event dropped");
            }
        }
    }

    fn deliver_sync(&self) {
        self.deliver(&ChannelEvent::Sync(self.snapshot()), None);
    }

    /// Remove one subscription's presence, emitting `leave` if it was the
    /// last meta under its key. Returns whether anything was removed.
    fn untrack(&mut self, sub_id: u64) -> bool {
        let Some((key, _)) = self.presences.remove(&sub_id) else {
            return false;
        };
        if !self.has_key(&key) {
            self.deliver(&ChannelEvent::Leave { key }, None);
        }
        self.deliver_sync();
        true
    }
}

impl LocalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe without going through the async `Transport` trait.
    ///
    /// # Errors
    ///
    /// Returns `Refused` if the hub is refusing new subscriptions.
    pub fn subscribe_local(&self, topic: &str, presence_key: &str) -> Result<Subscription, ChannelError> {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let bindings = Bindings::new();

        let sub_id = {
            let mut inner = self.lock();
            if inner.refuse {
                return Err(ChannelError::Refused(format!("topic {topic} is not accepting subscribers")));
            }
            inner.next_id += 1;
            let sub_id = inner.next_id;
            inner
                .topics
                .entry(topic.to_string())
                .or_default()
                .subscribers
                .insert(sub_id, Subscriber { key: presence_key.to_string(), tx, bindings: bindings.clone() });
            sub_id
        };

        info!(topic, key = presence_key, sub_id, "hub: subscribed");

        let handle = LocalHandle { hub: self.clone(), topic: topic.to_string(), sub_id, bindings, closed: false };
        Ok(Subscription { handle: Box::new(handle), events })
    }

    /// Number of distinct presence keys currently tracked on `topic`.
    #[must_use]
    pub fn presence_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |t| t.snapshot().len())
    }

    /// Number of live subscriptions on `topic`, tracked or not.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |t| t.subscribers.len())
    }

    fn track(&self, topic: &str, sub_id: u64, meta: PresenceMeta) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        let topic_state = inner.topics.get_mut(topic).ok_or(ChannelError::Closed)?;
        let key = topic_state
            .subscribers
            .get(&sub_id)
            .map(|s| s.key.clone())
            .ok_or(ChannelError::Closed)?;

        let is_new_key = !topic_state.has_key(&key);
        topic_state.presences.insert(sub_id, (key.clone(), meta.clone()));
        if is_new_key {
            topic_state.deliver(&ChannelEvent::Join { key, meta }, None);
        }
        topic_state.deliver_sync();
        Ok(())
    }

    fn untrack(&self, topic: &str, sub_id: u64) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        let topic_state = inner.topics.get_mut(topic).ok_or(ChannelError::Closed)?;
        if !topic_state.subscribers.contains_key(&sub_id) {
            return Err(ChannelError::Closed);
        }
        topic_state.untrack(sub_id);
        Ok(())
    }

    fn send(&self, topic: &str, sub_id: u64, event: &str, payload: serde_json::Value) -> Result<(), ChannelError> {
        let inner = self.lock();
        let topic_state = inner.topics.get(topic).ok_or(ChannelError::Closed)?;
        if !topic_state.subscribers.contains_key(&sub_id) {
            return Err(ChannelError::Closed);
        }
        topic_state.deliver(&ChannelEvent::Broadcast { event: event.to_string(), payload }, Some(sub_id));
        Ok(())
    }

    fn remove(&self, topic: &str, sub_id: u64) {
        let mut inner = self.lock();
        let Some(topic_state) = inner.topics.get_mut(topic) else {
            return;
        };
        topic_state.untrack(sub_id);
        if topic_state.subscribers.remove(&sub_id).is_some() {
            info!(topic, sub_id, "hub: unsubscribed");
        }
        if topic_state.subscribers.is_empty() {
            inner.topics.remove(topic);
        }
    }

    /// Make subsequent subscribe calls fail, simulating an outage.
    #[cfg(test)]
    pub(crate) fn refuse_subscriptions(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Drop every subscriber on `topic` without any presence events, the way
    /// a crashed transport would. Their event streams end.
    #[cfg(test)]
    pub(crate) fn disconnect_all(&self, topic: &str) {
        self.lock().topics.remove(topic);
    }
}

#[async_trait]
impl Transport for LocalHub {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, ChannelError> {
        self.subscribe_local(topic, presence_key)
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Outbound handle for one hub subscription. Dropping it unsubscribes.
pub struct LocalHandle {
    hub: LocalHub,
    topic: String,
    sub_id: u64,
    bindings: Bindings,
    closed: bool,
}

impl LocalHandle {
    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.closed { Err(ChannelError::Closed) } else { Ok(()) }
    }
}

#[async_trait]
impl ChannelHandle for LocalHandle {
    fn on(&mut self, binding: Binding) {
        self.bindings.add(binding);
    }

    async fn track(&self, meta: PresenceMeta) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.hub.track(&self.topic, self.sub_id, meta)
    }

    async fn untrack(&self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.hub.untrack(&self.topic, self.sub_id)
    }

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.hub.send(&self.topic, self.sub_id, event, payload)
    }

    async fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        if !self.closed {
            self.closed = true;
            self.hub.remove(&self.topic, self.sub_id);
        }
        Ok(())
    }
}

impl Drop for LocalHandle {
    fn drop(&mut self) {
        if !self.closed {
            self.hub.remove(&self.topic, self.sub_id);
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
