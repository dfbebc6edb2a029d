use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{ChatResult, WebSocketBufferConfig, WsFrame, WsTlsConfig};

pub mod fallback;
pub mod tungstenite;

pub use fallback::FallbackTransport;

/// Future returned by [`WsTransport::connect`].
pub type WsTransportConnectFuture<R, W> = Pin<Box<dyn Future<Output = ChatResult<(R, W)>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The IO loop lives outside kameo; the chat actor owns protocol state and only sees
/// [`WsFrame`]s. Implementations open the socket and hand back its read and write halves; the
/// STOMP handshake runs on top of them.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = ChatResult<WsFrame>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = crate::core::ChatError> + Send + Sync + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
        tls: WsTlsConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer>;
}
