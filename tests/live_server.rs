//! Servers bound to a real socket, exercised with real clients.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use module_server::channel::{ChannelModule, EchoHandler};
use reqwest::StatusCode;
use tokio_tungstenite::tungstenite::Message;

mod common;

#[tokio::test]
async fn serves_requests_and_stops_gracefully() {
    let server = common::build_server(common::test_config());
    let registry = server.registry().clone();
    let running = common::start(server).await;

    let client = reqwest::Client::new();
    let response = client.get(running.url("/hello")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "hello");

    let response = client.get(running.url("/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    running.stop().await;
    assert!(registry.is_disposed());
}

#[tokio::test]
async fn request_id_from_the_client_is_kept() {
    let running = common::start(common::build_server(common::test_config())).await;

    let response = reqwest::Client::new()
        .get(running.url("/hello"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    running.stop().await;
}

#[tokio::test]
async fn loopback_clients_are_whitelisted_by_default() {
    let mut config = common::test_config();
    config.banning.max_requests_per_second = 1;
    let running = common::start(common::build_server(config)).await;

    let client = reqwest::Client::new();
    for _ in 0..5 {
        let response = client.get(running.url("/hello")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    running.stop().await;
}

#[tokio::test]
async fn websocket_messages_are_echoed() {
    let server = common::build_server(common::test_config());
    let echo = ChannelModule::new("/ws", Arc::new(EchoHandler::default()));
    server.registry().add("websocket", Arc::new(echo)).unwrap();
    let running = common::start(server).await;

    let url = format!("ws://{}/ws", running.addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    socket.send(Message::text("ping me")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("echo should arrive")
        .expect("stream should stay open")
        .unwrap();
    assert_eq!(reply.to_text().unwrap(), "ping me");

    socket.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("echo should arrive")
        .expect("stream should stay open")
        .unwrap();
    assert_eq!(reply.into_data().as_ref(), &[1u8, 2, 3]);

    socket.close(None).await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn plain_request_to_a_channel_route_needs_upgrade() {
    let server = common::build_server(common::test_config());
    let echo = ChannelModule::new("/ws", Arc::new(EchoHandler::default()));
    server.registry().add("websocket", Arc::new(echo)).unwrap();
    let running = common::start(server).await;

    let response = reqwest::get(running.url("/ws")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);

    running.stop().await;
}
