//! Relay websocket handler: frames in, hub calls out.
//!
//! DESIGN
//! ======
//! On upgrade, each connection enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall
//! - Hub events for the joined topic → render as push frames to the client
//!
//! Handlers validate and call the hub, then return an `Outcome`. The
//! dispatch layer owns the reply: `done` for control syscalls, nothing for
//! successful broadcasts (they run at pointer rate), an error frame with a
//! grepable code for any failure.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → wait for `channel:subscribe {topic, key}`
//! 2. `presence:track` / `presence:untrack` / `broadcast:send` → hub
//! 3. Hub events → `presence:sync|join|leave`, `broadcast:<event>`
//! 4. Close or `channel:unsubscribe` → hub unsubscribe, peers see `leave`

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::channel::memory::LocalHub;
use crate::channel::{Binding, Subscription};
use crate::error::RelayError;
use crate::frame::{
    ChannelEvent, Data, FRAME_CODE, FRAME_MESSAGE, Frame, PresenceEventKind, PresenceMeta, SYSCALL_SEND,
    SYSCALL_SUBSCRIBE, SYSCALL_TRACK, SYSCALL_UNSUBSCRIBE, SYSCALL_UNTRACK, Status,
};

/// Syscall of the error frame sent for input that is not a frame at all.
const SYSCALL_RELAY_ERROR: &str = "relay:error";

/// Result of a handler. The dispatch layer decides what the client sees.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// Reply with an empty `done`.
    Done,
    /// No reply.
    Silent,
}

/// A connection's hub subscription.
struct Joined {
    topic: String,
    key: String,
    sub: Subscription,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(hub): State<LocalHub>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, hub))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, hub: LocalHub) {
    let conn_id = Uuid::new_v4();
    let mut joined: Option<Joined> = None;

    info!(%conn_id, "relay: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&hub, &mut joined, conn_id, text.as_str()).await;
                        if send_frames(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = next_event(&mut joined) => {
                let Some(joined_ref) = joined.as_ref() else { continue };
                let Some(event) = event else {
                    warn!(%conn_id, topic = %joined_ref.topic, "relay: hub stream ended");
                    break;
                };
                if send_frame(&mut socket, &event.to_frame(&joined_ref.topic)).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(mut current) = joined.take() {
        if let Err(e) = current.sub.handle.unsubscribe().await {
            debug!(%conn_id, error = %e, "relay: unsubscribe on close failed");
        }
        info!(%conn_id, topic = %current.topic, key = %current.key, "relay: released subscription");
    }
    info!(%conn_id, "relay: client disconnected");
}

async fn next_event(joined: &mut Option<Joined>) -> Option<ChannelEvent> {
    match joined {
        Some(current) => current.sub.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_frames(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), axum::Error> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let Ok(text) = serde_json::to_string(frame) else {
        warn!(syscall = %frame.syscall, "relay: failed to encode frame");
        return Ok(());
    };
    socket.send(Message::Text(text.into())).await
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
async fn process_inbound_text(
    hub: &LocalHub,
    joined: &mut Option<Joined>,
    conn_id: Uuid,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            warn!(%conn_id, error = %e, "relay: invalid inbound frame");
            let err = Frame::request(SYSCALL_RELAY_ERROR, Data::new())
                .with_data(FRAME_CODE, "E_INVALID_FRAME")
                .with_data(FRAME_MESSAGE, format!("invalid json: {e}"));
            return vec![err];
        }
    };

    if req.status != Status::Request {
        debug!(%conn_id, syscall = %req.syscall, "relay: ignoring non-request frame");
        return Vec::new();
    }

    if req.syscall == SYSCALL_SEND {
        trace!(%conn_id, "relay: recv broadcast");
    } else {
        info!(%conn_id, id = %req.id, syscall = %req.syscall, "relay: recv frame");
    }

    let result = match req.syscall.as_str() {
        SYSCALL_SUBSCRIBE => handle_subscribe(hub, joined, &req),
        SYSCALL_UNSUBSCRIBE => handle_unsubscribe(joined).await,
        SYSCALL_TRACK => handle_track(joined.as_ref(), &req).await,
        SYSCALL_UNTRACK => handle_untrack(joined.as_ref()).await,
        SYSCALL_SEND => handle_send(joined.as_ref(), &req).await,
        other => Err(RelayError::UnknownSyscall(other.to_string())),
    };

    match result {
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::Silent) => Vec::new(),
        Err(e) => {
            warn!(%conn_id, syscall = %req.syscall, error = %e, "relay: request failed");
            vec![req.error_from(&e)]
        }
    }
}

fn handle_subscribe(hub: &LocalHub, joined: &mut Option<Joined>, req: &Frame) -> Result<Outcome, RelayError> {
    if let Some(current) = joined.as_ref() {
        return Err(RelayError::AlreadySubscribed(current.topic.clone()));
    }
    let topic = req
        .topic
        .as_deref()
        .or_else(|| req.data_str("topic"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::InvalidFrame("topic required".into()))?;
    let key = req
        .data_str("key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| RelayError::InvalidFrame("presence key required".into()))?;

    let mut sub = hub.subscribe_local(topic, key)?;
    // The relay forwards everything; clients filter with their own bindings.
    sub.handle.on(Binding::Presence(PresenceEventKind::Sync));
    sub.handle.on(Binding::Presence(PresenceEventKind::Join));
    sub.handle.on(Binding::Presence(PresenceEventKind::Leave));
    sub.handle.on(Binding::AnyBroadcast);

    *joined = Some(Joined { topic: topic.to_string(), key: key.to_string(), sub });
    Ok(Outcome::Done)
}

async fn handle_unsubscribe(joined: &mut Option<Joined>) -> Result<Outcome, RelayError> {
    if let Some(mut current) = joined.take() {
        current.sub.handle.unsubscribe().await?;
    }
    Ok(Outcome::Done)
}

async fn handle_track(joined: Option<&Joined>, req: &Frame) -> Result<Outcome, RelayError> {
    let current = joined.ok_or(RelayError::NotSubscribed)?;
    let raw = req
        .data
        .get("meta")
        .cloned()
        .ok_or_else(|| RelayError::InvalidFrame("meta required".into()))?;
    let meta: PresenceMeta = serde_json::from_value(raw).map_err(|e| RelayError::InvalidFrame(e.to_string()))?;
    current.sub.handle.track(meta).await?;
    Ok(Outcome::Done)
}

async fn handle_untrack(joined: Option<&Joined>) -> Result<Outcome, RelayError> {
    let current = joined.ok_or(RelayError::NotSubscribed)?;
    current.sub.handle.untrack().await?;
    Ok(Outcome::Done)
}

async fn handle_send(joined: Option<&Joined>, req: &Frame) -> Result<Outcome, RelayError> {
    let current = joined.ok_or(RelayError::NotSubscribed)?;
    let event = req
        .data_str("event")
        .filter(|e| !e.is_empty())
        .ok_or_else(|| RelayError::InvalidFrame("event required".into()))?;
    let payload = req.data.get("payload").cloned().unwrap_or_default();
    current.sub.handle.send(event, payload).await?;
    Ok(Outcome::Silent)
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
