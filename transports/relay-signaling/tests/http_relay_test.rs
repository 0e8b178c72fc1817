//! HTTP relay client against a mock relay server
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test http_relay_test -- --nocapture
//! ```

mod fixtures;

use bytes::Bytes;
use fixtures::fake_engine::FakeEngine;
use fixtures::init_logging;
use fixtures::mock_relay::MockRelayServer;
use remotemedia_relay_signaling::{
    ConnectionRegistry, HandshakeState, HttpRelayClient, PeerConnection, RelayClient,
    RelaySignaler, RelaySignalingConfig, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn client(server: &MockRelayServer, timeout: Duration) -> HttpRelayClient {
    HttpRelayClient::new(server.base_url(), timeout).unwrap()
}

#[tokio::test]
async fn test_empty_mailbox_is_none() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let relay = client(&server, Duration::from_secs(2));

    assert!(relay.receive("nobody").await.unwrap().is_none());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_then_fetch_and_clear() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let relay = client(&server, Duration::from_secs(2));

    relay
        .send("desktop", Bytes::from_static(b"{\"kind\":\"Offer\"}"))
        .await
        .unwrap();
    relay
        .send("desktop", Bytes::from_static(b"{\"kind\":\"Answer\"}"))
        .await
        .unwrap();
    assert_eq!(server.pending("desktop"), 2);

    assert_eq!(
        relay.receive("desktop").await.unwrap().unwrap(),
        Bytes::from_static(b"{\"kind\":\"Offer\"}")
    );
    assert_eq!(
        relay.receive("desktop").await.unwrap().unwrap(),
        Bytes::from_static(b"{\"kind\":\"Answer\"}")
    );
    assert!(relay.receive("desktop").await.unwrap().is_none());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_retryable_status() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let relay = client(&server, Duration::from_secs(2));

    server.set_failure(Some(503));
    let err = relay.receive("desktop").await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 503, .. }));
    assert!(err.is_retryable());

    server.set_failure(Some(400));
    let err = relay
        .send("desktop", Bytes::from_static(b"{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 400, .. }));
    assert!(!err.is_retryable());

    server.set_failure(None);
    assert!(relay.receive("desktop").await.unwrap().is_none());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_relay_times_out() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let relay = client(&server, Duration::from_millis(50));

    server.set_delay(Duration::from_millis(500));
    let err = relay.receive("desktop").await.unwrap_err();
    assert_eq!(err, TransportError::Timeout);

    server.set_delay(Duration::ZERO);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_relay_is_request_error() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let base_url = server.base_url().to_string();
    server.shutdown().await.unwrap();

    let relay = HttpRelayClient::new(&base_url, Duration::from_secs(1)).unwrap();
    let err = relay.receive("desktop").await.unwrap_err();
    assert!(matches!(err, TransportError::Request(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poll_failures_clear_in_flight() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    server.set_failure(Some(500));

    let registry = ConnectionRegistry::new();
    let config = RelaySignalingConfig::default()
        .with_local_peer_id("desktop")
        .with_remote_peer_id("hololens")
        .with_poll_interval_ms(20.0);
    let relay = Arc::new(client(&server, Duration::from_secs(1)));
    let mut signaler = RelaySignaler::new(
        config,
        relay,
        Handle::current(),
        PeerConnection::new(&registry, FakeEngine::new("desktop")),
    )
    .unwrap();

    // Every poll fails, yet polling keeps going
    for _ in 0..50 {
        signaler.update(20.0);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(server.request_count() >= 2);
    assert_eq!(signaler.handshake_state(), HandshakeState::Idle);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_over_http_relay() {
    init_logging();
    let server = MockRelayServer::start().await.unwrap();
    let registry = ConnectionRegistry::new();

    let mut peers = Vec::new();
    for (local, remote) in [("hololens", "desktop"), ("desktop", "hololens")] {
        let engine = FakeEngine::new(local);
        let config = RelaySignalingConfig::default()
            .with_local_peer_id(local)
            .with_remote_peer_id(remote)
            .with_poll_interval_ms(20.0);
        let signaler = RelaySignaler::new(
            config,
            Arc::new(client(&server, Duration::from_secs(2))),
            Handle::current(),
            PeerConnection::new(&registry, engine.clone()),
        )
        .unwrap();
        signaler.peer().set_observer(Arc::new(signaler.handle()));
        peers.push((engine, signaler));
    }

    peers[0].1.start_offer().unwrap();

    let mut done = false;
    for _ in 0..400 {
        for (_, signaler) in peers.iter_mut() {
            signaler.update(20.0);
        }
        done = peers.iter().all(|(engine, signaler)| {
            signaler.handshake_state() == HandshakeState::Connected
                && engine.remote_candidates().len() == 1
        });
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(done, "handshake over HTTP relay did not complete");

    let (offerer, answerer) = (&peers[0].0, &peers[1].0);
    assert_eq!(offerer.remote_candidates(), vec![answerer.local_candidate()]);
    assert_eq!(answerer.remote_candidates(), vec![offerer.local_candidate()]);

    drop(peers);
    assert!(registry.is_empty());
    server.shutdown().await.unwrap();
}
