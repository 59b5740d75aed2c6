use super::*;

#[tokio::test]
async fn healthz_is_ok() {
    assert_eq!(healthz().await, StatusCode::OK);
}

#[tokio::test]
async fn presence_count_reflects_tracked_keys() {
    let hub = LocalHub::new();
    let Json(empty) = presence_count(State(hub.clone()), Path("lobby".into())).await;
    assert_eq!(empty, PresenceCount { topic: "lobby".into(), count: 0 });

    let sub = hub.subscribe_local("lobby", "v1").expect("subscribe");
    sub.handle
        .track(crate::frame::PresenceMeta::new("t", crate::frame::Section::Hero))
        .await
        .expect("track");

    let Json(one) = presence_count(State(hub.clone()), Path("lobby".into())).await;
    assert_eq!(one.count, 1);
}

#[tokio::test]
async fn relay_serves_health_over_http() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve(listener, LocalHub::new()));

    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
    .expect("write");
    let mut response = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
        .await
        .expect("read");

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    server.abort();
}
