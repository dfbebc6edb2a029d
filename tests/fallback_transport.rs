mod common;

use chat_ws::core::{StompCommand, WebSocketBufferConfig, WsTlsConfig};
use chat_ws::testing::{MockServer, MockTransport, echo_of};
use chat_ws::transport::{FallbackTransport, WsTransport};
use chat_ws::{ChatClient, ChatError, ConnectionState, InboundMessage, StaticToken};
use common::{QUIET, TOKEN, WAIT, config, inbound, init_tracing, outgoing};
use tokio::sync::mpsc;

const FALLBACK_URL: &str = "ws://mock.chat/poll";

type Fallback = FallbackTransport<MockTransport, MockTransport>;

struct Pair {
    client: ChatClient<Fallback>,
    primary: MockServer,
    secondary: MockServer,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

fn pair() -> Pair {
    init_tracing();
    let (primary_transport, primary) = MockTransport::channel_pair();
    let (secondary_transport, secondary) = MockTransport::channel_pair();
    let transport =
        FallbackTransport::new(primary_transport, secondary_transport).with_secondary_url(FALLBACK_URL);
    let (tx, inbound) = mpsc::unbounded_channel();
    let client = ChatClient::with_transport(
        config(),
        transport,
        StaticToken::new(TOKEN),
        move |message: InboundMessage| {
            let _ = tx.send(message);
        },
    );
    Pair {
        client,
        primary,
        secondary,
        inbound,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn primary_carries_the_session_when_it_connects() {
    let mut p = pair();
    let client = p.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = p.primary.accept_timeout(WAIT).await.expect("primary socket");
    assert_eq!(conn.url(), "ws://mock.chat/ws");
    conn.accept_stomp().await.expect("CONNECT frame");
    conn.expect_subscribe("/broadcast").await.expect("broadcast SUBSCRIBE");
    assert!(connecting.await.unwrap());

    assert!(p.secondary.accept_timeout(QUIET).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_primary_falls_back_to_the_secondary_url() {
    let mut p = pair();
    p.primary.refuse_connections(true);
    let client = p.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = p
        .secondary
        .accept_timeout(WAIT)
        .await
        .expect("fallback socket");
    assert_eq!(conn.url(), FALLBACK_URL);
    let connect = conn.accept_stomp().await.expect("CONNECT frame");
    assert_eq!(connect.get("Authorization"), Some("Bearer good-token"));
    let broadcast = conn
        .expect_subscribe("/broadcast")
        .await
        .expect("broadcast SUBSCRIBE");
    assert!(connecting.await.unwrap());
    assert!(p.primary.accept_timeout(QUIET).await.is_none());

    // Frames flow both ways through the fallback halves.
    conn.send_message(&broadcast, "/broadcast", &inbound(1, 0, 9, "via fallback"))
        .unwrap();
    let delivered = tokio::time::timeout(WAIT, p.inbound.recv())
        .await
        .expect("delivered")
        .unwrap();
    assert_eq!(delivered.message_id, 1);

    let msg = outgoing(4, 1, "over fallback");
    let sending = tokio::spawn({
        let client = p.client.clone();
        let msg = msg.clone();
        async move { client.send_message(msg).await }
    });
    let sub = conn
        .expect_subscribe("/conversation/4")
        .await
        .expect("conversation SUBSCRIBE");
    let send = conn.recv_frame_timeout(WAIT).await.expect("SEND frame");
    assert_eq!(send.command, StompCommand::Send);
    conn.send_message(&sub, "/conversation/4", &echo_of(&msg, 40))
        .unwrap();
    assert_eq!(sending.await.unwrap().expect("echo").message_id, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn both_transports_refused_fails_connect() {
    let mut p = pair();
    p.primary.refuse_connections(true);
    p.secondary.refuse_connections(true);

    assert!(!p.client.connect().await);
    assert_eq!(p.client.connection_state().await, ConnectionState::Failed);
    assert!(p.primary.accept_timeout(QUIET).await.is_none());
    assert!(p.secondary.accept_timeout(QUIET).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn both_failures_are_reported_together() {
    init_tracing();
    let (primary_transport, primary) = MockTransport::channel_pair();
    let (secondary_transport, secondary) = MockTransport::channel_pair();
    primary.refuse_connections(true);
    secondary.refuse_connections(true);
    let transport =
        FallbackTransport::new(primary_transport, secondary_transport).with_secondary_url(FALLBACK_URL);

    let result = transport
        .connect(
            "ws://mock.chat/ws".to_string(),
            WebSocketBufferConfig::default(),
            WsTlsConfig::default(),
        )
        .await;
    let err = match result {
        Ok(_) => panic!("both transports were refused"),
        Err(err) => err,
    };
    let detail = match err {
        ChatError::ConnectionFailed(detail) => detail,
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(detail.contains("primary: "), "{detail}");
    assert!(detail.contains("ws://mock.chat/ws"), "{detail}");
    assert!(detail.contains("fallback: "), "{detail}");
    assert!(detail.contains(FALLBACK_URL), "{detail}");
}
