use crate::core::{ChatError, ChatResult, StompFrame, WsFrame};
use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::watch;
use tracing::debug;

/// Writer actor that owns the transport writer and serializes STOMP frames onto the wire.
pub struct StompWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
}

impl<W> StompWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            writer,
            shutdown_rx,
        }
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if *self.shutdown_rx.borrow() {
            return Err(ChatError::InvalidState("writer stopped".to_string()));
        }
        Ok(())
    }
}

impl<W> Actor for StompWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = ChatError;

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "StompWriterActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Encode and write one STOMP frame as a websocket text frame.
#[derive(Clone)]
pub struct WriterWrite {
    pub frame: StompFrame,
}

impl<W> KameoMessage<WriterWrite> for StompWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_open()?;
        debug!(target: "chat-ws-writer", command = %msg.frame.command, "sending stomp frame");
        self.writer.send(WsFrame::Text(msg.frame.encode())).await
    }
}

/// Send a websocket close frame and close the sink. Errors are reported, not retried.
pub struct WriterClose;

impl<W> KameoMessage<WriterClose> for StompWriterActor<W>
where
    W: Sink<WsFrame, Error = ChatError> + Send + Sync + Unpin + 'static,
{
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        _msg: WriterClose,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_open()?;
        self.writer.feed(WsFrame::Close(None)).await?;
        self.writer.close().await
    }
}
