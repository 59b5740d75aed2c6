//! Websocket transport: the channel contract over a relay connection.
//!
//! DESIGN
//! ======
//! One websocket per subscription. `subscribe` connects, sends a
//! `channel:subscribe` frame and waits for its terminal reply. After that
//! the socket is split:
//! - a writer task drains an `mpsc` of outbound frames into the sink,
//! - a reader task parses pushed frames into `ChannelEvent`s, filters them
//!   through the handle's bindings and forwards them to the subscriber.
//!
//! When the reader ends (close frame, socket error) the event sender drops
//! and the subscriber sees a closed stream. When the handle goes away the
//! writer drains what is queued, then closes the socket, and the relay
//! releases our presence. `unsubscribe` gives the writer `CLOSE_GRACE` to
//! do that and aborts both tasks if it is stuck on a peer that stopped
//! reading.
//!
//! TRADE-OFFS
//! ==========
//! Track/untrack/send are fire-and-forget over the socket: the relay's
//! `done` replies are not awaited. Errors it reports come back as error
//! frames and are logged by the reader.
//!
//! Nothing on the handle waits for queue space. A full outbound queue
//! drops a `send` and fails `track`/`untrack` with `ChannelError::Busy`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Binding, Bindings, ChannelHandle, EVENT_BUFFER, Subscription, Transport};
use crate::error::ChannelError;
use crate::frame::{
    ChannelEvent, Data, FRAME_MESSAGE, Frame, PresenceMeta, SYSCALL_SEND, SYSCALL_SUBSCRIBE, SYSCALL_TRACK,
    SYSCALL_UNSUBSCRIBE, SYSCALL_UNTRACK, Status,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How long an unsubscribing writer may take to flush and close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Subscribes through a relay at a `ws://` or `wss://` URL.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    /// `connect_timeout` bounds the connect plus the subscribe handshake.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self { url: url.into(), connect_timeout }
    }

    async fn open(&self, topic: &str, presence_key: &str) -> Result<Subscription, ChannelError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (mut sink, mut source) = socket.split();

        let request = Frame::request(SYSCALL_SUBSCRIBE, Data::new())
            .with_topic(topic)
            .with_data("key", presence_key);
        send_frame(&mut sink, &request).await?;
        await_reply(&mut source, request.id).await?;

        info!(url = %self.url, topic, key = presence_key, "ws: subscribed");

        let (out_tx, out_rx) = mpsc::channel(EVENT_BUFFER);
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let bindings = Bindings::new();
        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(read_loop(source, event_tx, bindings.clone()));

        let handle = WsHandle {
            topic: topic.to_string(),
            out_tx: Some(out_tx),
            bindings,
            tasks: Some((writer, reader)),
        };
        Ok(Subscription { handle: Box::new(handle), events })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, ChannelError> {
        tokio::time::timeout(self.connect_timeout, self.open(topic, presence_key))
            .await
            .map_err(|_| ChannelError::Timeout)?
    }
}

// =============================================================================
// SOCKET TASKS
// =============================================================================

async fn send_frame(sink: &mut WsSink, frame: &Frame) -> Result<(), ChannelError> {
    let text = serde_json::to_string(frame)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| ChannelError::Connect(e.to_string()))
}

/// Wait for the terminal reply to `request_id`. Anything else is skipped.
async fn await_reply(source: &mut WsSource, request_id: Uuid) -> Result<(), ChannelError> {
    loop {
        let Some(message) = source.next().await else {
            return Err(ChannelError::Closed);
        };
        let message = message.map_err(|e| ChannelError::Connect(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return Err(ChannelError::Closed),
            _ => continue,
        };
        let frame: Frame = serde_json::from_str(text.as_str())?;
        if frame.parent_id != Some(request_id) {
            continue;
        }
        match frame.status {
            Status::Done => return Ok(()),
            Status::Error => {
                let reason = frame.data_str(FRAME_MESSAGE).unwrap_or("subscribe rejected");
                return Err(ChannelError::Refused(reason.to_string()));
            }
            Status::Request => {
                return Err(ChannelError::Protocol(format!("non-terminal reply to {}", frame.syscall)));
            }
        }
    }
}

async fn write_loop(mut sink: WsSink, mut outbound: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = send_frame(&mut sink, &frame).await {
            debug!(error = %e, syscall = %frame.syscall, "ws: write failed");
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "ws: close failed");
    }
}

async fn read_loop(mut source: WsSource, events: mpsc::Sender<ChannelEvent>, bindings: Bindings) {
    while let Some(message) = source.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "ws: read failed");
                break;
            }
        };
        let frame: Frame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "ws: unparseable frame dropped");
                continue;
            }
        };
        if frame.status == Status::Error {
            warn!(syscall = %frame.syscall, message = frame.data_str(FRAME_MESSAGE).unwrap_or(""), "ws: relay reported error");
            continue;
        }
        let Some(event) = ChannelEvent::from_frame(&frame) else {
            continue;
        };
        if !bindings.accepts(&event) {
            continue;
        }
        match events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => debug!("ws: subscriber queue full, event dropped"),
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    debug!("ws: reader finished");
}

// =============================================================================
// HANDLE
// =============================================================================

/// Outbound half of a websocket subscription.
pub struct WsHandle {
    topic: String,
    out_tx: Option<mpsc::Sender<Frame>>,
    bindings: Bindings,
    tasks: Option<(JoinHandle<()>, JoinHandle<()>)>,
}

impl WsHandle {
    fn push(&self, frame: Frame) -> Result<(), ChannelError> {
        let tx = self.out_tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.try_send(frame.with_topic(self.topic.as_str())).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Busy,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

#[async_trait]
impl ChannelHandle for WsHandle {
    fn on(&mut self, binding: Binding) {
        self.bindings.add(binding);
    }

    async fn track(&self, meta: PresenceMeta) -> Result<(), ChannelError> {
        let frame = Frame::request(SYSCALL_TRACK, Data::new()).with_data("meta", serde_json::to_value(&meta)?);
        self.push(frame)
    }

    async fn untrack(&self) -> Result<(), ChannelError> {
        self.push(Frame::request(SYSCALL_UNTRACK, Data::new()))
    }

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), ChannelError> {
        let frame = Frame::request(SYSCALL_SEND, Data::new())
            .with_data("event", event)
            .with_data("payload", payload);
        match self.push(frame) {
            Err(ChannelError::Busy) => {
                debug!(topic = %self.topic, event, "ws: outbound queue full, broadcast dropped");
                Ok(())
            }
            other => other,
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        let Some(tx) = self.out_tx.take() else {
            return Ok(());
        };
        let frame = Frame::request(SYSCALL_UNSUBSCRIBE, Data::new()).with_topic(self.topic.as_str());
        if let Err(e) = tx.try_send(frame) {
            debug!(topic = %self.topic, error = %e, "ws: unsubscribe frame not queued");
        }
        drop(tx);

        let Some((mut writer, reader)) = self.tasks.take() else {
            return Ok(());
        };
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            warn!(topic = %self.topic, "ws: writer stuck on close, aborting socket");
            writer.abort();
            reader.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
