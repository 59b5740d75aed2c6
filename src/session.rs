//! Live session: one page's presence subsystem, mount to teardown.
//!
//! DESIGN
//! ======
//! `LiveSession::mount` spawns a single driver task that exclusively owns
//! the synchronizer, the cursor store, the broadcaster and the notices.
//! Everything reaches it as a message and is handled one at a time:
//! - local input (pointer moves, scrolls) from the host,
//! - channel events from the transport,
//! - the periodic TTL sweep,
//! - the next notice expiry.
//!
//! The host reads state through `watch` receivers: the presence status
//! (`count`, `is_connected`), the cursor list and the active notices. The
//! status receiver is usable on its own, without any cursor rendering.
//!
//! LIFECYCLE
//! =========
//! 1. Mount → `Subscribing`, subscribe, bind, `track` the initial meta
//! 2. First `sync` → `Synced`, `is_connected = true`
//! 3. Teardown → stop the sweep, `untrack`, `unsubscribe`, back to solo
//!
//! Teardown is idempotent and bounded: the release calls get
//! `RELEASE_TIMEOUT` between them, so a wedged transport cannot hold it up.
//! Dropping the session without calling it still stops the driver, which
//! releases the channel on its way out.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error to the host. A failed subscribe or a lost
//! transport degrades to solo mode (`count = 1`, no remote cursors).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{Binding, Subscription, Transport};
use crate::config::PresenceConfig;
use crate::cursor::{CursorBroadcaster, CursorStore, Viewport};
use crate::frame::{CURSOR_EVENT, ChannelEvent, CursorState, PresenceEventKind, Section, now_iso8601, now_ms};
use crate::identity::Identity;
use crate::notice::{JoinNotice, Notices};
use crate::presence::{PresenceEffect, PresenceStatus, PresenceSynchronizer};

/// Depth of the host → driver input queue.
const INPUT_BUFFER: usize = 64;

/// Upper bound on `untrack` + `unsubscribe` during teardown. Longer than
/// the websocket close grace, so a stuck socket is aborted, not leaked.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Host input forwarded to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalInput {
    PointerMove { px: f64, py: f64, viewport: Viewport },
    Scroll(Section),
}

// =============================================================================
// SESSION
// =============================================================================

pub struct LiveSession {
    identity: Identity,
    input_tx: mpsc::Sender<LocalInput>,
    status_rx: watch::Receiver<PresenceStatus>,
    cursors_rx: watch::Receiver<Vec<CursorState>>,
    notices_rx: watch::Receiver<Vec<JoinNotice>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveSession {
    /// Start the presence subsystem for one page. Must be called from
    /// within a Tokio runtime.
    pub fn mount(transport: Arc<dyn Transport>, identity: Identity, config: PresenceConfig) -> Self {
        Self::mount_in(transport, identity, config, Section::Hero)
    }

    /// Like [`LiveSession::mount`], starting in a section other than the hero.
    pub fn mount_in(transport: Arc<dyn Transport>, identity: Identity, config: PresenceConfig, section: Section) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (status_tx, status_rx) = watch::channel(PresenceStatus::solo());
        let (cursors_tx, cursors_rx) = watch::channel(Vec::new());
        let (notices_tx, notices_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            presence: PresenceSynchronizer::new(identity.visitor_id.clone()),
            store: CursorStore::new(identity.visitor_id.clone(), config.max_cursors, config.stale_after),
            broadcaster: CursorBroadcaster::new(&identity, config.throttle, section, now_iso8601()),
            notices: Notices::new(config.notice_for),
            identity: identity.clone(),
            config,
            status_tx,
            cursors_tx,
            notices_tx,
        };

        info!(visitor_id = %identity.visitor_id, "session: mounting");
        let task = tokio::spawn(driver.run(transport, input_rx, shutdown_rx));

        Self {
            identity,
            input_tx,
            status_rx,
            cursors_rx,
            notices_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Visitor count and connection flag, for badges and indicators.
    #[must_use]
    pub fn presence(&self) -> watch::Receiver<PresenceStatus> {
        self.status_rx.clone()
    }

    #[must_use]
    pub fn status(&self) -> PresenceStatus {
        *self.status_rx.borrow()
    }

    /// Remote cursors, ordered by visitor id.
    #[must_use]
    pub fn cursors(&self) -> watch::Receiver<Vec<CursorState>> {
        self.cursors_rx.clone()
    }

    #[must_use]
    pub fn notices(&self) -> watch::Receiver<Vec<JoinNotice>> {
        self.notices_rx.clone()
    }

    /// Report a pointer move in viewport pixels. Samples are droppable, so
    /// a full input queue discards this one.
    pub fn pointer_move(&self, px: f64, py: f64, viewport: Viewport) {
        self.push_input(LocalInput::PointerMove { px, py, viewport });
    }

    /// Report that the viewer scrolled into `section`.
    pub fn scroll(&self, section: Section) {
        self.push_input(LocalInput::Scroll(section));
    }

    fn push_input(&self, input: LocalInput) {
        if let Err(e) = self.input_tx.try_send(input) {
            debug!(error = %e, "session: input dropped");
        }
    }

    /// Stop the driver and release the channel. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.take() {
            if shutdown.send(()).is_err() {
                debug!("session: driver already stopped");
            }
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session: driver task failed");
            }
        }
    }
}

// =============================================================================
// DRIVER
// =============================================================================

struct Driver {
    identity: Identity,
    config: PresenceConfig,
    presence: PresenceSynchronizer,
    store: CursorStore,
    broadcaster: CursorBroadcaster,
    notices: Notices,
    status_tx: watch::Sender<PresenceStatus>,
    cursors_tx: watch::Sender<Vec<CursorState>>,
    notices_tx: watch::Sender<Vec<JoinNotice>>,
}

impl Driver {
    async fn run(
        mut self,
        transport: Arc<dyn Transport>,
        mut input_rx: mpsc::Receiver<LocalInput>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        self.presence.begin_subscribe();
        self.publish_status();

        let mut channel = tokio::select! {
            _ = &mut shutdown_rx => {
                self.finish(None).await;
                return;
            }
            channel = self.connect(transport.as_ref()) => channel,
        };

        let mut sweep = tokio::time::interval(self.config.sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let notice_deadline = self.notices.next_expiry();
            tokio::select! {
                _ = &mut shutdown_rx => break,
                input = input_rx.recv() => {
                    let Some(input) = input else { break };
                    self.handle_input(input, channel.as_ref()).await;
                }
                event = next_event(&mut channel) => {
                    if let Some(event) = event {
                        self.handle_event(&event);
                    } else {
                        warn!(visitor_id = %self.identity.visitor_id, "session: transport closed, running solo");
                        channel = None;
                        self.broadcaster.reset_tracking();
                        let effects = self.presence.disconnect();
                        self.apply_effects(effects);
                        self.publish_status();
                    }
                }
                _ = sweep.tick() => {
                    if !self.store.sweep(now_ms()).is_empty() {
                        self.publish_cursors();
                    }
                }
                () = sleep_until_ms(notice_deadline) => {
                    if self.notices.expire(now_ms()) {
                        self.publish_notices();
                    }
                }
            }
        }

        self.finish(channel).await;
    }

    async fn connect(&mut self, transport: &dyn Transport) -> Option<Subscription> {
        let topic = self.config.topic.clone();
        let attempt = tokio::time::timeout(
            self.config.subscribe_timeout,
            transport.subscribe(&topic, &self.identity.visitor_id),
        )
        .await;

        let mut sub = match attempt {
            Ok(Ok(sub)) => sub,
            Ok(Err(e)) => {
                warn!(%topic, error = %e, "session: subscribe failed, running solo");
                self.degrade();
                return None;
            }
            Err(_) => {
                warn!(%topic, timeout_ms = self.config.subscribe_timeout.as_millis(), "session: subscribe timed out, running solo");
                self.degrade();
                return None;
            }
        };

        sub.handle.on(Binding::Presence(PresenceEventKind::Sync));
        sub.handle.on(Binding::Presence(PresenceEventKind::Join));
        sub.handle.on(Binding::Presence(PresenceEventKind::Leave));
        sub.handle.on(Binding::Broadcast(CURSOR_EVENT.to_string()));

        let section = self.broadcaster.section();
        match sub.handle.track(self.broadcaster.presence_meta()).await {
            Ok(()) => self.broadcaster.mark_tracked(section),
            Err(e) => warn!(%topic, error = %e, "session: initial track failed"),
        }
        info!(%topic, visitor_id = %self.identity.visitor_id, "session: subscribed");
        Some(sub)
    }

    fn degrade(&mut self) {
        let effects = self.presence.disconnect();
        self.apply_effects(effects);
        self.publish_status();
    }

    async fn handle_input(&mut self, input: LocalInput, channel: Option<&Subscription>) {
        match input {
            LocalInput::PointerMove { px, py, viewport } => {
                let Some(sub) = channel else { return };
                let Some(cursor) = self.broadcaster.on_pointer_move(px, py, viewport, Instant::now(), now_ms()) else {
                    return;
                };
                let payload = match serde_json::to_value(&cursor) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "session: failed to encode cursor");
                        return;
                    }
                };
                if let Err(e) = sub.handle.send(CURSOR_EVENT, payload).await {
                    debug!(error = %e, "session: cursor send failed");
                }
            }
            LocalInput::Scroll(section) => {
                let Some(meta) = self.broadcaster.on_scroll(section) else { return };
                let Some(sub) = channel else { return };
                debug!(%section, "session: re-tracking section");
                match sub.handle.track(meta).await {
                    Ok(()) => self.broadcaster.mark_tracked(section),
                    Err(e) => warn!(%section, error = %e, "session: section track failed"),
                }
            }
        }
    }

    fn handle_event(&mut self, event: &ChannelEvent) {
        if let ChannelEvent::Broadcast { event: name, payload } = event {
            if name == CURSOR_EVENT && self.store.ingest_payload(payload).changed() {
                self.publish_cursors();
            }
            return;
        }
        let effects = self.presence.handle_event(event);
        self.apply_effects(effects);
        self.publish_status();
    }

    fn apply_effects(&mut self, effects: Vec<PresenceEffect>) {
        for effect in effects {
            match effect {
                PresenceEffect::Joined(id) => {
                    info!(visitor_id = %id, "session: visitor joined");
                    self.notices.push(&id, now_ms());
                    self.publish_notices();
                }
                PresenceEffect::Left(id) => {
                    if self.store.remove(&id) {
                        self.publish_cursors();
                    }
                }
                PresenceEffect::ClearCursors => {
                    if self.store.clear() {
                        self.publish_cursors();
                    }
                    self.notices.clear();
                    self.publish_notices();
                }
            }
        }
    }

    async fn finish(&mut self, channel: Option<Subscription>) {
        if let Some(mut sub) = channel {
            let release = async {
                if let Err(e) = sub.handle.untrack().await {
                    debug!(error = %e, "session: untrack on teardown failed");
                }
                if let Err(e) = sub.handle.unsubscribe().await {
                    debug!(error = %e, "session: unsubscribe on teardown failed");
                }
            };
            if tokio::time::timeout(RELEASE_TIMEOUT, release).await.is_err() {
                warn!(timeout_ms = RELEASE_TIMEOUT.as_millis(), "session: channel release timed out");
            }
        }
        self.degrade();
        info!(visitor_id = %self.identity.visitor_id, "session: torn down");
    }

    fn publish_status(&self) {
        let status = self.presence.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn publish_cursors(&self) {
        self.cursors_tx.send_replace(self.store.snapshot());
    }

    fn publish_notices(&self) {
        self.notices_tx.send_replace(self.notices.active().to_vec());
    }
}

/// Next event from the subscription; pending forever when there is none.
/// `None` means the transport closed the stream.
async fn next_event(channel: &mut Option<Subscription>) -> Option<ChannelEvent> {
    match channel {
        Some(sub) => sub.events.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the epoch-ms deadline; pending forever without one.
async fn sleep_until_ms(deadline: Option<i64>) {
    let Some(at) = deadline else {
        return std::future::pending().await;
    };
    let wait = u64::try_from(at.saturating_sub(now_ms())).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(wait + 1)).await;
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
