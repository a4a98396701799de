// ABOUTME: Behavioral tests for the WebSocket snapshot stream against a real listener

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::fixtures::{eventually, TestApp, ADMIN_TOKEN};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: &TestApp) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    let shutdown = app.shutdown.clone();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });
    (addr, handle)
}

/// Next text frame parsed as a snapshot array.
async fn next_snapshot(client: &mut Client) -> Vec<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            return value.as_array().unwrap().clone();
        }
    }
}

#[tokio::test]
async fn test_stream_sends_current_then_changes() {
    let app = TestApp::new();
    app.source.add_session("api", &[("claude", "starting")]);
    app.monitor.poll_once().await;
    let (addr, server) = serve(&app).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?token={ADMIN_TOKEN}"))
        .await
        .unwrap();

    let initial = next_snapshot(&mut client).await;
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0]["panes"][0]["content"], "starting");

    app.source.set_text("api", 0, "halfway");
    app.monitor.poll_once().await;
    let update = next_snapshot(&mut client).await;
    assert_eq!(update[0]["panes"][0]["content"], "halfway");

    app.source.add_session("web", &[("zsh", "$")]);
    app.monitor.poll_once().await;
    let update = next_snapshot(&mut client).await;
    assert_eq!(update.len(), 2);

    client.close(None).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || app.monitor.subscriber_count() == 0).await);

    app.shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn test_unchanged_poll_sends_nothing() {
    let app = TestApp::new();
    app.source.add_session("api", &[("claude", "same")]);
    app.monitor.poll_once().await;
    let (addr, server) = serve(&app).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?token={ADMIN_TOKEN}"))
        .await
        .unwrap();
    next_snapshot(&mut client).await;

    // Identical content within the idle window serializes identically
    app.monitor.poll_once().await;
    let quiet = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(quiet.is_err(), "expected no frame for an unchanged snapshot");

    drop(client);
    app.shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn test_device_token_streams_and_missing_token_rejected() {
    let app = TestApp::new();
    let paired = app.pair_device("Phone").await;
    let (addr, server) = serve(&app).await;

    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?token={}", paired.token))
        .await
        .unwrap();
    assert!(next_snapshot(&mut client).await.is_empty());

    app.shutdown.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let app = TestApp::new();
    let (addr, server) = serve(&app).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws?token={ADMIN_TOKEN}"))
        .await
        .unwrap();
    next_snapshot(&mut client).await;

    app.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server shut down with a stream open")
        .unwrap();

    // The client observes the close
    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(msg)) = client.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    let _ = client.send(Message::Close(None)).await;
}
