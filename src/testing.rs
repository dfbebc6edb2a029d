//! Reusable test utilities for exercising the chat client without a real socket.
//!
//! [`MockTransport`] hands every connection attempt to a [`MockServer`], which plays the STOMP
//! broker: tests accept connections, answer `CONNECT`, read what the client wrote, push `MESSAGE`
//! frames and drop sockets.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Sink;
use tokio::sync::mpsc;

use crate::core::stomp;
use crate::core::{
    ChatError, ChatResult, InboundMessage, StompCommand, StompFrame, WebSocketBufferConfig,
    WsFrame, WsTlsConfig,
};
use crate::transport::{WsTransport, WsTransportConnectFuture};

/// A transport that uses in-memory channels so tests can emulate the broker.
///
/// Create it with [`MockTransport::channel_pair`] to obtain both:
/// - the transport for [`ChatClient`](crate::client::ChatClient)
/// - a [`MockServer`] handle that accepts each connection the client opens.
#[derive(Clone)]
pub struct MockTransport {
    accept_tx: mpsc::UnboundedSender<MockConnection>,
    refuse: Arc<AtomicBool>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicBool::new(false));
        (
            Self {
                accept_tx,
                refuse: Arc::clone(&refuse),
            },
            MockServer { accept_rx, refuse },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
        _tls: WsTlsConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let accept_tx = self.accept_tx.clone();
        let refuse = self.refuse.load(Ordering::Acquire);
        Box::pin(async move {
            if refuse {
                return Err(ChatError::ConnectionFailed(format!(
                    "mock server refused {url}"
                )));
            }
            let (sent_tx, sent_rx) = mpsc::unbounded_channel::<WsFrame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WsFrame>();
            accept_tx
                .send(MockConnection {
                    url,
                    outbound_rx: sent_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| ChatError::ConnectionFailed("mock server is gone".to_string()))?;
            Ok((MockReader { rx: inbound_rx }, MockWriter { sent_tx }))
        })
    }
}

/// Error surface for operations on [`MockConnection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The client side is no longer receiving inbound frames.
    ChannelClosed,
    /// The message body could not be serialized.
    Encode,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client channel is closed"),
            MockServerError::Encode => f.write_str("mock message body failed to serialize"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Broker-side handle paired with [`MockTransport`].
pub struct MockServer {
    accept_rx: mpsc::UnboundedReceiver<MockConnection>,
    refuse: Arc<AtomicBool>,
}

impl MockServer {
    /// Wait for the client to open a socket.
    pub async fn accept(&mut self) -> Option<MockConnection> {
        self.accept_rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockConnection> {
        tokio::time::timeout(timeout, self.accept_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Make subsequent socket opens fail before any STOMP traffic.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }
}

/// One accepted socket, seen from the broker.
pub struct MockConnection {
    url: String,
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockConnection {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receive a raw websocket frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    /// Receive the next STOMP frame written by the client, skipping control frames.
    ///
    /// Returns `None` once the client closed the socket or stopped writing.
    pub async fn recv_frame(&mut self) -> Option<StompFrame> {
        loop {
            let frame = self.outbound_rx.recv().await?;
            if frame.is_close() {
                return None;
            }
            let Some(data) = frame.data() else {
                continue;
            };
            if let Ok(Some(frame)) = stomp::decode(data) {
                return Some(frame);
            }
        }
    }

    pub async fn recv_frame_timeout(&mut self, timeout: Duration) -> Option<StompFrame> {
        tokio::time::timeout(timeout, self.recv_frame())
            .await
            .unwrap_or_default()
    }

    /// Read the client's `CONNECT` and answer `CONNECTED`. Returns the `CONNECT` frame.
    pub async fn accept_stomp(&mut self) -> Option<StompFrame> {
        let connect = self.recv_frame().await?;
        if connect.command != StompCommand::Connect && connect.command != StompCommand::Stomp {
            return None;
        }
        self.send_connected().ok()?;
        Some(connect)
    }

    /// Read the next frame and return its subscription id if it is a `SUBSCRIBE` to
    /// `destination`.
    pub async fn expect_subscribe(&mut self, destination: &str) -> Option<String> {
        let frame = self.recv_frame().await?;
        if frame.command != StompCommand::Subscribe || frame.get("destination") != Some(destination)
        {
            return None;
        }
        frame.get("id").map(str::to_string)
    }

    /// Push an inbound frame to the client.
    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a raw payload as websocket text.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text))
    }

    pub fn send_frame(&self, frame: &StompFrame) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::Text(frame.encode()))
    }

    pub fn send_connected(&self) -> Result<(), MockServerError> {
        self.send_frame(
            &StompFrame::new(StompCommand::Connected)
                .header("version", "1.2")
                .header("heart-beat", "0,0"),
        )
    }

    /// Send a STOMP `ERROR`; before `CONNECTED` this rejects the handshake.
    pub fn send_error(&self, message: &str) -> Result<(), MockServerError> {
        self.send_frame(&StompFrame::new(StompCommand::Error).header("message", message))
    }

    /// Deliver a `MESSAGE` with a raw body on `subscription`/`destination`.
    pub fn send_message_raw(
        &self,
        subscription: &str,
        destination: &str,
        body: impl Into<Bytes>,
    ) -> Result<(), MockServerError> {
        self.send_frame(
            &StompFrame::new(StompCommand::Message)
                .header("destination", destination)
                .header("subscription", subscription)
                .header("message-id", "mock-1")
                .header("content-type", "application/json")
                .body(body),
        )
    }

    /// Deliver `message` serialized as JSON on `subscription`/`destination`.
    pub fn send_message(
        &self,
        subscription: &str,
        destination: &str,
        message: &InboundMessage,
    ) -> Result<(), MockServerError> {
        let body = sonic_rs::to_vec(message).map_err(|_| MockServerError::Encode)?;
        self.send_message_raw(subscription, destination, body)
    }

    /// Simulate a server-side socket drop by closing the inbound channel.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = ChatResult<WsFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = ChatError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| {
                ChatError::transport("mock_transport_write", "mock outbound channel closed")
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Echo of `message` as the server would publish it, with a server-assigned id.
pub fn echo_of(message: &crate::core::OutgoingMessage, message_id: i64) -> InboundMessage {
    InboundMessage {
        message_id,
        sender_id: message.sender_id,
        conversation_id: message.conversation_id,
        content: message.content.clone(),
        attachments: Vec::new(),
        sent_at: message.sent_at.clone(),
        kind: message.kind.clone(),
        avatar_url: message.avatar_url.clone(),
    }
}
