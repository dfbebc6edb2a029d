#![allow(dead_code)]

use std::time::{Duration, Instant};

use chat_ws::testing::{MockConnection, MockServer, MockTransport};
use chat_ws::{
    ChatClient, ChatClientConfig, ConnectionState, InboundMessage, OutgoingMessage, StaticToken,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(100);
pub const TOKEN: &str = "good-token";

pub struct Harness {
    pub client: ChatClient<MockTransport>,
    pub server: MockServer,
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

pub fn config() -> ChatClientConfig {
    ChatClientConfig::new("ws://mock.chat/ws")
        .with_send_timeout(Duration::from_millis(200))
        .with_handshake_timeout(Duration::from_millis(500))
}

/// Log to the test writer; `RUST_LOG=chat_ws=debug` shows per-frame traces.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn harness(config: ChatClientConfig) -> Harness {
    init_tracing();
    let (transport, server) = MockTransport::channel_pair();
    let (tx, inbound) = mpsc::unbounded_channel();
    let client = ChatClient::with_transport(
        config,
        transport,
        StaticToken::new(TOKEN),
        move |message: InboundMessage| {
            let _ = tx.send(message);
        },
    );
    Harness {
        client,
        server,
        inbound,
    }
}

/// Drive a full handshake: socket open, CONNECT/CONNECTED, broadcast SUBSCRIBE.
///
/// Returns the broker side of the connection and the broadcast subscription id.
pub async fn connect(h: &mut Harness) -> (MockConnection, String) {
    let client = h.client.clone();
    let connecting = tokio::spawn(async move { client.connect().await });

    let mut conn = h.server.accept_timeout(WAIT).await.expect("socket opened");
    let connect = conn.accept_stomp().await.expect("CONNECT frame");
    assert_eq!(connect.get("Authorization"), Some("Bearer good-token"));
    let broadcast = conn
        .expect_subscribe("/broadcast")
        .await
        .expect("broadcast SUBSCRIBE");

    assert!(connecting.await.expect("connect task"));
    (conn, broadcast)
}

/// Subscribe through the client and return the subscription id the broker saw.
pub async fn subscribe(h: &Harness, conn: &mut MockConnection, conversation_id: i64) -> String {
    h.client
        .subscribe_to_conversation(conversation_id)
        .await
        .expect("subscribe");
    conn.expect_subscribe(&format!("/conversation/{conversation_id}"))
        .await
        .expect("conversation SUBSCRIBE")
}

pub fn outgoing(conversation_id: i64, sender_id: i64, content: &str) -> OutgoingMessage {
    OutgoingMessage {
        sender_id,
        conversation_id,
        content: content.to_string(),
        sent_at: "2026-10-19T09:00:00Z".to_string(),
        kind: "TEXT".to_string(),
        sender_first_name: "Alex".to_string(),
        avatar_url: None,
    }
}

pub fn inbound(
    message_id: i64,
    conversation_id: i64,
    sender_id: i64,
    content: &str,
) -> InboundMessage {
    InboundMessage {
        message_id,
        sender_id,
        conversation_id,
        content: content.to_string(),
        attachments: Vec::new(),
        sent_at: "2026-10-19T09:00:01Z".to_string(),
        kind: "TEXT".to_string(),
        avatar_url: None,
    }
}

pub async fn wait_for_state(client: &ChatClient<MockTransport>, want: ConnectionState) {
    let deadline = Instant::now() + WAIT;
    loop {
        let state = client.connection_state().await;
        if state == want {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {want}, still {state}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert nothing reaches the inbound handler for a short while.
pub async fn assert_no_inbound(h: &mut Harness) {
    if let Ok(Some(message)) = tokio::time::timeout(QUIET, h.inbound.recv()).await {
        panic!("unexpected inbound message: {message:?}");
    }
}
