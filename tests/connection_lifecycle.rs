mod common;

use std::time::Duration;

use chat_ws::core::StompCommand;
use chat_ws::{ChatError, ConnectionState};
use common::{
    QUIET, WAIT, assert_no_inbound, config, connect, harness, inbound, outgoing, subscribe,
    wait_for_state,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_credentials_fail_connect_and_block_subscribe() {
    let mut h = harness(config());
    let client = h.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = h.server.accept_timeout(WAIT).await.expect("socket opened");
    let connect = conn.recv_frame_timeout(WAIT).await.expect("CONNECT frame");
    assert_eq!(connect.command, StompCommand::Connect);
    assert_eq!(connect.get("accept-version"), Some("1.2,1.1,1.0"));
    conn.send_error("Invalid access token").unwrap();

    assert!(!connecting.await.unwrap());
    assert_eq!(h.client.connection_state().await, ConnectionState::Failed);

    let err = h
        .client
        .subscribe_to_conversation(1)
        .await
        .expect_err("subscribe must fail while not connected");
    assert_eq!(
        err,
        ChatError::NotConnected {
            operation: "subscribe",
            state: ConnectionState::Failed,
        }
    );
    assert!(!h.client.is_subscribed(1).await);
    assert!(conn.recv_frame_timeout(QUIET).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_after_failure_starts_a_fresh_handshake() {
    let mut h = harness(config());
    h.server.refuse_connections(true);
    assert!(!h.client.connect().await);
    assert_eq!(h.client.connection_state().await, ConnectionState::Failed);

    // No retry happens on its own.
    assert!(h.server.accept_timeout(QUIET).await.is_none());

    h.server.refuse_connections(false);
    let (_conn, _) = connect(&mut h).await;
    assert_eq!(h.client.connection_state().await, ConnectionState::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_connects_share_one_handshake() {
    let mut h = harness(config());
    let attempts: Vec<_> = (0..3)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.connect().await })
        })
        .collect();

    let mut conn = h.server.accept_timeout(WAIT).await.expect("socket opened");
    conn.accept_stomp().await.expect("CONNECT frame");
    conn.expect_subscribe("/broadcast").await.expect("broadcast SUBSCRIBE");

    for attempt in attempts {
        assert!(attempt.await.unwrap());
    }
    assert!(h.server.accept_timeout(QUIET).await.is_none());

    // Already connected: resolves immediately without a new socket.
    assert!(h.client.connect().await);
    assert!(h.server.accept_timeout(QUIET).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_without_reply_times_out() {
    let mut h = harness(config().with_handshake_timeout(Duration::from_millis(100)));
    let client = h.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = h.server.accept_timeout(WAIT).await.expect("socket opened");
    conn.recv_frame_timeout(WAIT).await.expect("CONNECT frame");

    assert!(!connecting.await.unwrap());
    assert_eq!(h.client.connection_state().await, ConnectionState::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_during_handshake_discards_late_connected() {
    let mut h = harness(config());
    let client = h.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = h.server.accept_timeout(WAIT).await.expect("socket opened");
    conn.recv_frame_timeout(WAIT).await.expect("CONNECT frame");
    h.client.disconnect().await.unwrap();
    assert!(!connecting.await.unwrap());

    let _ = conn.send_connected();
    tokio::time::sleep(QUIET).await;
    assert_eq!(
        h.client.connection_state().await,
        ConnectionState::Disconnected
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_rejects_pending_and_silences_handler() {
    let mut h = harness(config().with_send_timeout(Duration::from_secs(5)));
    let (mut conn, broadcast) = connect(&mut h).await;
    let sub = subscribe(&h, &mut conn, 7).await;

    let sending = tokio::spawn({
        let client = h.client.clone();
        async move { client.send_message(outgoing(7, 1, "bye")).await }
    });
    conn.recv_frame_timeout(WAIT).await.expect("SEND frame");

    h.client.disconnect().await.unwrap();

    let err = sending.await.unwrap().expect_err("pending send rejected");
    assert!(matches!(err, ChatError::Disconnected { .. }), "{err:?}");
    let goodbye = conn.recv_frame_timeout(WAIT).await.expect("DISCONNECT frame");
    assert_eq!(goodbye.command, StompCommand::Disconnect);

    let _ = conn.send_message(&sub, "/conversation/7", &inbound(1, 7, 2, "late"));
    let _ = conn.send_message(&broadcast, "/broadcast", &inbound(2, 0, 2, "late"));
    assert_no_inbound(&mut h).await;

    assert_eq!(
        h.client.connection_state().await,
        ConnectionState::Disconnected
    );
    assert!(!h.client.is_subscribed(7).await);
    assert_eq!(h.client.pending_sends().await, 0);
    assert!(matches!(
        h.client.subscribe_to_conversation(7).await,
        Err(ChatError::NotConnected { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lost_socket_tears_down_without_reconnecting() {
    let mut h = harness(config().with_send_timeout(Duration::from_secs(5)));
    let (mut conn, _) = connect(&mut h).await;
    subscribe(&h, &mut conn, 3).await;

    let sending = tokio::spawn({
        let client = h.client.clone();
        async move { client.send_message(outgoing(3, 1, "still there?")).await }
    });
    conn.recv_frame_timeout(WAIT).await.expect("SEND frame");

    conn.drop_socket();

    let err = sending.await.unwrap().expect_err("pending send rejected");
    assert!(matches!(err, ChatError::Disconnected { .. }), "{err:?}");
    wait_for_state(&h.client, ConnectionState::Disconnected).await;
    assert!(!h.client.is_subscribed(3).await);
    assert!(h.server.accept_timeout(QUIET).await.is_none());

    // The owner decides when to come back.
    let (_conn, _) = connect(&mut h).await;
    assert!(!h.client.is_subscribed(3).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_error_frame_ends_the_session() {
    let mut h = harness(config());
    let (conn, _) = connect(&mut h).await;

    conn.send_error("session expired").unwrap();

    wait_for_state(&h.client, ConnectionState::Disconnected).await;
    assert!(h.server.accept_timeout(QUIET).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_the_client() {
    let mut h = harness(config());
    let (mut conn, _) = connect(&mut h).await;

    h.client.shutdown().await;

    let goodbye = conn.recv_frame_timeout(WAIT).await.expect("DISCONNECT frame");
    assert_eq!(goodbye.command, StompCommand::Disconnect);
    assert!(!h.client.connect().await);
    assert!(matches!(
        h.client.status().await,
        Err(ChatError::ActorError(_))
    ));
}
