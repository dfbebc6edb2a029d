//! Chat socket actor.
//!
//! The websocket IO loop runs outside kameo; the actor owns connection state, the subscription
//! registry and the pending-send table, and receives frames via messages. Every message carrying
//! socket data is tagged with the connection epoch it was read on, so nothing from a torn-down
//! connection can reach the handler or a pending send.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::actor_error;
use super::writer::{StompWriterActor, WriterClose, WriterWrite};
use crate::auth::TokenProvider;
use crate::core::stomp;
use crate::core::{
    ChatClientConfig, ChatError, ChatResult, ConnectionState, DisconnectCause, InboundMessage,
    OutgoingMessage, PendingSendTable, StompCommand, StompFrame, SubscriptionRegistry,
    SubscriptionTarget, WsFrame, close_reason,
};
use crate::handler::InboundHandler;
use crate::transport::WsTransport;
use kameo::error::ActorStopReason;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};

/// Upper bound on the best-effort `DISCONNECT` + close during an explicit disconnect.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

type SendWaiter = oneshot::Sender<ChatResult<InboundMessage>>;

/// Arguments passed when constructing a chat socket actor.
pub struct ChatSocketArgs<T: WsTransport> {
    pub config: ChatClientConfig,
    pub transport: T,
    pub tokens: Arc<dyn TokenProvider>,
    pub handler: Box<dyn InboundHandler>,
}

/// Owner of the single chat connection.
pub struct ChatSocketActor<T: WsTransport> {
    config: ChatClientConfig,
    transport: T,
    tokens: Arc<dyn TokenProvider>,
    handler: Box<dyn InboundHandler>,
    actor_ref: ActorRef<Self>,
    state: ConnectionState,
    epoch: u64,
    registry: SubscriptionRegistry,
    pending: PendingSendTable<SendWaiter>,
    connect_waiters: Vec<oneshot::Sender<bool>>,
    writer_ref: Option<ActorRef<StompWriterActor<T::Writer>>>,
    reader_task: Option<JoinHandle<()>>,
    expiry_timer: Option<(Instant, JoinHandle<()>)>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T: WsTransport> Actor for ChatSocketActor<T> {
    type Args = ChatSocketArgs<T>;
    type Error = ChatError;

    fn name() -> &'static str {
        "ChatSocketActor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> ChatResult<Self> {
        let ChatSocketArgs {
            config,
            transport,
            tokens,
            handler,
        } = args;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = SubscriptionRegistry::new(config.conversation_topic_prefix.clone());
        let pending = PendingSendTable::new(config.max_pending_sends);

        Ok(Self {
            config,
            transport,
            tokens,
            handler,
            actor_ref: ctx,
            state: ConnectionState::Disconnected,
            epoch: 0,
            registry,
            pending,
            connect_waiters: Vec::new(),
            writer_ref: None,
            reader_task: None,
            expiry_timer: None,
            shutdown_tx,
            shutdown_rx,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: ActorStopReason,
    ) -> ChatResult<()> {
        self.teardown(DisconnectCause::Requested).await;
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "ChatSocketActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Start (or join) a handshake. The receiver yields `true` once connected, `false` on failure.
pub struct Connect;

/// Tear the connection down; pending sends are rejected and subscriptions released.
pub struct Disconnect;

pub struct Subscribe {
    pub conversation_id: i64,
}

pub struct Unsubscribe {
    pub conversation_id: i64,
}

/// Publish a message. The receiver yields its echo or the reason it never arrived.
pub struct SendChat {
    pub message: OutgoingMessage,
}

pub struct GetStatus;

/// Snapshot of the actor's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStatus {
    pub state: ConnectionState,
    pub subscriptions: Vec<i64>,
    pub pending_sends: usize,
}

pub(crate) struct HandshakeCompleted<T: WsTransport> {
    epoch: u64,
    result: ChatResult<(T::Reader, T::Writer)>,
}

pub(crate) struct InboundFrame {
    epoch: u64,
    data: Bytes,
}

pub(crate) struct ConnectionLost {
    epoch: u64,
    cause: DisconnectCause,
}

pub(crate) struct ExpirePendingSends;

impl<T: WsTransport> KameoMessage<Connect> for ChatSocketActor<T> {
    type Reply = ChatResult<oneshot::Receiver<bool>>;

    async fn handle(
        &mut self,
        _msg: Connect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let (tx, rx) = oneshot::channel();
        match self.state {
            ConnectionState::Connected => {
                let _ = tx.send(true);
            }
            ConnectionState::Connecting => {
                debug!(epoch = self.epoch, "joining in-flight handshake");
                self.connect_waiters.push(tx);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.connect_waiters.push(tx);
                self.start_handshake();
            }
        }
        Ok(rx)
    }
}

impl<T: WsTransport> KameoMessage<Disconnect> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        _msg: Disconnect,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.teardown(DisconnectCause::Requested).await;
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<Subscribe> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: Subscribe,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.require_connected("subscribe", msg.conversation_id)?;
        self.ensure_subscribed(msg.conversation_id).await
    }
}

impl<T: WsTransport> KameoMessage<Unsubscribe> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: Unsubscribe,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.require_connected("unsubscribe", msg.conversation_id)?;
        let Some(sub) = self.registry.unsubscribe(msg.conversation_id) else {
            debug!(conversation_id = msg.conversation_id, "not subscribed; unsubscribe is a no-op");
            return Ok(());
        };
        debug!(
            conversation_id = sub.conversation_id,
            handle = %sub.handle,
            "unsubscribing from conversation"
        );
        self.write_or_teardown(StompFrame::unsubscribe(&sub.handle))
            .await
    }
}

impl<T: WsTransport> KameoMessage<SendChat> for ChatSocketActor<T> {
    type Reply = ChatResult<oneshot::Receiver<ChatResult<InboundMessage>>>;

    async fn handle(
        &mut self,
        msg: SendChat,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let message = msg.message;
        if !self.state.is_connected() {
            return Err(ChatError::NotConnected {
                operation: "send message",
                state: self.state,
            });
        }
        let body = message.to_json()?;
        self.ensure_subscribed(message.conversation_id).await?;

        let timeout = self.config.send_timeout;
        let (tx, rx) = oneshot::channel();
        let send_id = self
            .pending
            .insert(
                message.conversation_id,
                message.sender_id,
                &message.content,
                Instant::now() + timeout,
                tx,
            )
            .map_err(|_| ChatError::TooManyPending {
                max: self.config.max_pending_sends,
            })?;

        let frame = StompFrame::send_json(&self.config.publish_destination, body);
        if let Err(err) = self.write_frame(frame).await {
            self.pending.remove(send_id);
            self.teardown(DisconnectCause::WriteFailure {
                error: err.to_string(),
            })
            .await;
            return Err(err);
        }
        debug!(
            conversation_id = message.conversation_id,
            sender_id = message.sender_id,
            send_id,
            "message published; awaiting echo"
        );

        self.arm_expiry();
        Ok(rx)
    }
}

impl<T: WsTransport> KameoMessage<GetStatus> for ChatSocketActor<T> {
    type Reply = ChatResult<ChatStatus>;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(ChatStatus {
            state: self.state,
            subscriptions: self.registry.conversation_ids(),
            pending_sends: self.pending.len(),
        })
    }
}

impl<T: WsTransport> KameoMessage<HandshakeCompleted<T>> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: HandshakeCompleted<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || self.state != ConnectionState::Connecting {
            // Disconnected while the handshake was in flight; dropping the halves closes it.
            debug!(epoch = msg.epoch, current = self.epoch, "discarding stale handshake");
            return Ok(());
        }
        match msg.result {
            Ok((reader, writer)) => self.on_connected(reader, writer).await,
            Err(err) => {
                warn!(url = %self.config.url, error = %err, "chat handshake failed");
                self.state = ConnectionState::Failed;
                self.resolve_connect_waiters(false);
            }
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<InboundFrame> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: InboundFrame,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch != self.epoch || !self.state.is_connected() {
            return Ok(());
        }
        let frame = match stomp::decode(&msg.data) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(epoch = msg.epoch, error = %err, "dropping malformed stomp frame");
                return Ok(());
            }
        };
        match frame.command {
            StompCommand::Message => self.process_message(&frame),
            StompCommand::Error => {
                let message = server_error_message(&frame);
                self.teardown(DisconnectCause::ServerError { message }).await;
            }
            other => debug!(command = %other, "ignoring stomp frame"),
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<ConnectionLost> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        msg: ConnectionLost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if msg.epoch == self.epoch && self.state.is_connected() {
            self.teardown(msg.cause).await;
        }
        Ok(())
    }
}

impl<T: WsTransport> KameoMessage<ExpirePendingSends> for ChatSocketActor<T> {
    type Reply = ChatResult<()>;

    async fn handle(
        &mut self,
        _msg: ExpirePendingSends,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let timeout = self.config.send_timeout;
        for expired in self.pending.expire_due(Instant::now()) {
            warn!(
                conversation_id = expired.conversation_id,
                send_id = expired.send_id,
                timeout = ?timeout,
                "no echo received for message"
            );
            let _ = expired.waiter.send(Err(ChatError::SendTimeout {
                conversation_id: expired.conversation_id,
                timeout,
            }));
        }
        if let Some((_, timer)) = self.expiry_timer.take() {
            timer.abort();
        }
        self.arm_expiry();
        Ok(())
    }
}

impl<T: WsTransport> ChatSocketActor<T> {
    fn require_connected(&self, operation: &'static str, conversation_id: i64) -> ChatResult<()> {
        if self.state.is_connected() {
            return Ok(());
        }
        warn!(
            conversation_id,
            state = %self.state,
            operation,
            "rejecting subscription change while not connected"
        );
        Err(ChatError::NotConnected {
            operation,
            state: self.state,
        })
    }

    fn start_handshake(&mut self) {
        self.state = ConnectionState::Connecting;
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let token = self.tokens.access_token();
        let transport = self.transport.clone();
        let config = self.config.clone();
        let self_ref = self.actor_ref.clone();
        info!(url = %config.url, epoch, "connecting to chat server");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(
                config.handshake_timeout,
                handshake(transport, &config, token),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ChatError::Timeout {
                    context: format!("stomp handshake within {:?}", config.handshake_timeout),
                }),
            };
            let _ = self_ref
                .tell(HandshakeCompleted::<T> { epoch, result })
                .send()
                .await;
        });
    }

    async fn on_connected(&mut self, reader: T::Reader, writer: T::Writer) {
        self.state = ConnectionState::Connected;
        let writer = StompWriterActor::spawn(StompWriterActor::new(
            writer,
            self.shutdown_rx.clone(),
        ));
        self.writer_ref = Some(writer);
        self.reader_task = Some(self.spawn_reader(reader));

        let broadcast = self.config.broadcast_topic.clone();
        if let Some(handle) = self.registry.subscribe_broadcast(&broadcast) {
            if self
                .write_or_teardown(StompFrame::subscribe(&handle, &broadcast))
                .await
                .is_err()
            {
                return;
            }
        }
        info!(url = %self.config.url, epoch = self.epoch, "chat connection established");
        self.resolve_connect_waiters(true);
    }

    fn spawn_reader(&self, mut read: T::Reader) -> JoinHandle<()> {
        let actor_ref = self.actor_ref.clone();
        let epoch = self.epoch;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow_and_update() { break; }
                    }
                    next = read.next() => {
                        let lost = match next {
                            Some(Ok(WsFrame::Close(frame))) => DisconnectCause::RemoteClosed {
                                reason: close_reason(frame.as_ref()),
                            },
                            Some(Ok(WsFrame::Text(data) | WsFrame::Binary(data))) => {
                                if actor_ref.tell(InboundFrame { epoch, data }).send().await.is_err() {
                                    break;
                                }
                                continue;
                            }
                            Some(Ok(WsFrame::Ping(_) | WsFrame::Pong(_))) => continue,
                            Some(Err(err)) => DisconnectCause::ReadFailure {
                                error: err.to_string(),
                            },
                            None => DisconnectCause::RemoteClosed {
                                reason: "stream ended".to_string(),
                            },
                        };
                        let _ = actor_ref.tell(ConnectionLost { epoch, cause: lost }).send().await;
                        break;
                    }
                }
            }
        })
    }

    async fn ensure_subscribed(&mut self, conversation_id: i64) -> ChatResult<()> {
        let Some(sub) = self.registry.subscribe(conversation_id) else {
            debug!(conversation_id, "already subscribed");
            return Ok(());
        };
        debug!(
            conversation_id,
            handle = %sub.handle,
            destination = %sub.destination,
            "subscribing to conversation"
        );
        self.write_or_teardown(StompFrame::subscribe(&sub.handle, &sub.destination))
            .await
    }

    fn process_message(&mut self, frame: &StompFrame) {
        let Some(target) = self
            .registry
            .route(frame.get("subscription"), frame.get("destination"))
        else {
            debug!(
                subscription = ?frame.get("subscription"),
                destination = ?frame.get("destination"),
                "dropping message for unknown subscription"
            );
            return;
        };
        let message = match InboundMessage::from_json(&frame.body) {
            Ok(message) => message,
            Err(err) => {
                warn!(target_topic = ?target, error = %err, "dropping undecodable chat message");
                return;
            }
        };

        if let SubscriptionTarget::Conversation(conversation_id) = target {
            if let Some(pending) = self.pending.take_match(conversation_id, &message) {
                debug!(
                    conversation_id,
                    send_id = pending.send_id,
                    message_id = message.message_id,
                    "echo matched pending send"
                );
                let _ = pending.waiter.send(Ok(message));
                return;
            }
        }
        self.handler.on_message(message);
    }

    async fn write_frame(&mut self, frame: StompFrame) -> ChatResult<()> {
        let Some(writer) = self.writer_ref.as_ref() else {
            return Err(ChatError::NotConnected {
                operation: "write",
                state: self.state,
            });
        };
        writer
            .ask(WriterWrite { frame })
            .await
            .map_err(actor_error("stomp writer"))
    }

    /// Write a frame; a failed write means the connection is gone.
    async fn write_or_teardown(&mut self, frame: StompFrame) -> ChatResult<()> {
        if let Err(err) = self.write_frame(frame).await {
            self.teardown(DisconnectCause::WriteFailure {
                error: err.to_string(),
            })
            .await;
            return Err(err);
        }
        Ok(())
    }

    /// Keep one timer armed for the earliest pending deadline.
    fn arm_expiry(&mut self) {
        let Some(deadline) = self.pending.next_deadline() else {
            if let Some((_, timer)) = self.expiry_timer.take() {
                timer.abort();
            }
            return;
        };
        if let Some((armed, _)) = self.expiry_timer.as_ref() {
            if *armed <= deadline {
                return;
            }
        }
        if let Some((_, timer)) = self.expiry_timer.take() {
            timer.abort();
        }
        let actor_ref = self.actor_ref.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = actor_ref.tell(ExpirePendingSends).send().await;
        });
        self.expiry_timer = Some((deadline, timer));
    }

    fn resolve_connect_waiters(&mut self, connected: bool) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(connected);
        }
    }

    /// Shared by `disconnect`, lost connections and actor stop. Never schedules a reconnect.
    async fn teardown(&mut self, cause: DisconnectCause) {
        let previous = self.state;

        if let Some(writer) = self.writer_ref.take() {
            if cause == DisconnectCause::Requested && previous.is_connected() {
                let goodbye = async {
                    let _ = writer
                        .ask(WriterWrite {
                            frame: StompFrame::disconnect(),
                        })
                        .await;
                    let _ = writer.ask(WriterClose).await;
                };
                if tokio::time::timeout(DISCONNECT_GRACE, goodbye).await.is_err() {
                    debug!("best-effort DISCONNECT timed out");
                }
            }
            let _ = self.shutdown_tx.send(true);
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(reader) = self.reader_task.take() {
            // The reader may be parked on our own mailbox; never await it from here.
            reader.abort();
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;
        self.shutdown_rx = shutdown_rx;

        if let Some((_, timer)) = self.expiry_timer.take() {
            timer.abort();
        }
        let reason = cause.to_string();
        let rejected = self.pending.drain();
        let rejected_count = rejected.len();
        for pending in rejected {
            let _ = pending.waiter.send(Err(ChatError::disconnected(reason.clone())));
        }
        let released = self.registry.clear();
        self.resolve_connect_waiters(false);

        self.state = ConnectionState::Disconnected;
        self.epoch = self.epoch.wrapping_add(1);

        if previous == ConnectionState::Disconnected || previous == ConnectionState::Failed {
            return;
        }
        match cause {
            DisconnectCause::Requested => info!(
                reason = %reason,
                pending_rejected = rejected_count,
                subscriptions_released = released,
                "chat connection closed"
            ),
            _ => warn!(
                reason = %reason,
                pending_rejected = rejected_count,
                subscriptions_released = released,
                "chat connection lost"
            ),
        }
    }
}

/// Open the socket and run the STOMP `CONNECT`/`CONNECTED` exchange.
async fn handshake<T: WsTransport>(
    transport: T,
    config: &ChatClientConfig,
    token: Option<String>,
) -> ChatResult<(T::Reader, T::Writer)> {
    let (mut reader, mut writer) = transport
        .connect(config.url.clone(), config.ws_buffers, config.tls)
        .await?;

    let connect = StompFrame::connect(&config.stomp_host, token.as_deref());
    writer.send(WsFrame::Text(connect.encode())).await?;

    while let Some(next) = reader.next().await {
        let frame = match next? {
            WsFrame::Close(frame) => {
                return Err(ChatError::ConnectionFailed(format!(
                    "closed during handshake: {}",
                    close_reason(frame.as_ref())
                )));
            }
            other => other,
        };
        let Some(data) = frame.data() else {
            continue;
        };
        let Some(reply) = stomp::decode(data)? else {
            continue;
        };
        match reply.command {
            StompCommand::Connected => {
                debug!(version = ?reply.get("version"), "stomp session established");
                return Ok((reader, writer));
            }
            StompCommand::Error => {
                return Err(ChatError::AuthenticationFailed {
                    message: server_error_message(&reply),
                });
            }
            other => debug!(command = %other, "ignoring frame before CONNECTED"),
        }
    }
    Err(ChatError::ConnectionFailed(
        "socket closed during handshake".to_string(),
    ))
}

fn server_error_message(frame: &StompFrame) -> String {
    frame
        .get("message")
        .map(str::to_string)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).into_owned())
}
