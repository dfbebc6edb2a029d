use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tracing::warn;

use crate::core::{ChatError, ChatResult, WebSocketBufferConfig, WsFrame, WsTlsConfig};
use crate::transport::{WsTransport, WsTransportConnectFuture};

/// Transport that tries `primary` and falls back to `secondary` when the primary connect fails.
///
/// The secondary is given its own endpoint URL (for example an HTTP-upgrade-friendly path on a
/// proxy), so both halves of the pair stay plain [`WsTransport`]s and the chat actor never learns
/// which one carried the session.
#[derive(Clone)]
pub struct FallbackTransport<A, B> {
    primary: A,
    secondary: B,
    secondary_url: Option<String>,
}

impl<A, B> FallbackTransport<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self {
            primary,
            secondary,
            secondary_url: None,
        }
    }

    /// Connect the secondary to `url` instead of the configured endpoint.
    pub fn with_secondary_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_url = Some(url.into());
        self
    }
}

pub enum EitherReader<A, B> {
    Primary(A),
    Secondary(B),
}

pub enum EitherWriter<A, B> {
    Primary(A),
    Secondary(B),
}

impl<A, B> Stream for EitherReader<A, B>
where
    A: Stream<Item = ChatResult<WsFrame>> + Unpin,
    B: Stream<Item = ChatResult<WsFrame>> + Unpin,
{
    type Item = ChatResult<WsFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            EitherReader::Primary(inner) => Pin::new(inner).poll_next(cx),
            EitherReader::Secondary(inner) => Pin::new(inner).poll_next(cx),
        }
    }
}

impl<A, B> Sink<WsFrame> for EitherWriter<A, B>
where
    A: Sink<WsFrame, Error = ChatError> + Unpin,
    B: Sink<WsFrame, Error = ChatError> + Unpin,
{
    type Error = ChatError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.get_mut() {
            EitherWriter::Primary(inner) => Pin::new(inner).poll_ready(cx),
            EitherWriter::Secondary(inner) => Pin::new(inner).poll_ready(cx),
        }
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        match self.get_mut() {
            EitherWriter::Primary(inner) => Pin::new(inner).start_send(item),
            EitherWriter::Secondary(inner) => Pin::new(inner).start_send(item),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.get_mut() {
            EitherWriter::Primary(inner) => Pin::new(inner).poll_flush(cx),
            EitherWriter::Secondary(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.get_mut() {
            EitherWriter::Primary(inner) => Pin::new(inner).poll_close(cx),
            EitherWriter::Secondary(inner) => Pin::new(inner).poll_close(cx),
        }
    }
}

impl<A, B> WsTransport for FallbackTransport<A, B>
where
    A: WsTransport,
    B: WsTransport,
{
    type Reader = EitherReader<A::Reader, B::Reader>;
    type Writer = EitherWriter<A::Writer, B::Writer>;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
        tls: WsTlsConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let primary = self.primary.clone();
        let secondary = self.secondary.clone();
        let secondary_url = self.secondary_url.clone().unwrap_or_else(|| url.clone());
        Box::pin(async move {
            match primary.connect(url.clone(), buffers, tls).await {
                Ok((reader, writer)) => Ok((
                    EitherReader::Primary(reader),
                    EitherWriter::Primary(writer),
                )),
                Err(primary_err) => {
                    warn!(
                        url = %url,
                        fallback_url = %secondary_url,
                        error = %primary_err,
                        "primary transport failed; trying fallback"
                    );
                    let (reader, writer) = secondary
                        .connect(secondary_url, buffers, tls)
                        .await
                        .map_err(|err| {
                            ChatError::ConnectionFailed(format!(
                                "primary: {primary_err}; fallback: {err}"
                            ))
                        })?;
                    Ok((
                        EitherReader::Secondary(reader),
                        EitherWriter::Secondary(writer),
                    ))
                }
            }
        })
    }
}
