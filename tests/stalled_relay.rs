//! A relay that acknowledges the subscribe and then stops reading must not
//! wedge the session driver or its teardown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use live_presence::LiveSession;
use live_presence::channel::ws::WsTransport;
use live_presence::config::PresenceConfig;
use live_presence::cursor::Viewport;
use live_presence::frame::{Frame, Section};
use live_presence::identity::Identity;
use live_presence::presence::PresenceStatus;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const VIEWPORT: Viewport = Viewport { width: 800.0, height: 600.0 };

async fn spawn_stalled_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let Some(Ok(Message::Text(text))) = ws.next().await else {
            return;
        };
        let request: Frame = serde_json::from_str(text.as_str()).expect("subscribe frame");
        let reply = serde_json::to_string(&request.done()).expect("encode reply");
        ws.send(Message::Text(reply.into())).await.expect("send reply");
        std::future::pending::<()>().await;
        drop(ws);
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn teardown_completes_behind_a_relay_that_stopped_reading() {
    let url = spawn_stalled_relay().await;
    let config = PresenceConfig {
        topic: "stalled".into(),
        throttle: Duration::ZERO,
        ..PresenceConfig::default()
    };
    let transport = Arc::new(WsTransport::new(url, Duration::from_secs(2)));
    let identity = Identity { visitor_id: "v-stuck".into(), color: "#ef4444".into() };
    let mut session = LiveSession::mount(transport, identity, config);

    // Flood until the socket and the outbound queue are long past full.
    let flood_until = tokio::time::Instant::now() + Duration::from_secs(4);
    let mut sections = Section::ALL.iter().copied().cycle();
    let mut step = 0u32;
    while tokio::time::Instant::now() < flood_until {
        session.pointer_move(f64::from(step % 800), f64::from(step % 600), VIEWPORT);
        if step % 500 == 0 {
            if let Some(section) = sections.next() {
                session.scroll(section);
            }
        }
        step = step.wrapping_add(1);
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(Duration::from_secs(5), session.teardown())
        .await
        .expect("teardown hung behind a stalled relay");
    assert_eq!(session.status(), PresenceStatus::solo());
}
