use std::sync::Arc;

use kameo::prelude::{Actor, ActorRef};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::core::{
    ChatClientConfig, ChatError, ChatResult, ConnectionState, InboundMessage, OutgoingMessage,
};
use crate::handler::InboundHandler;
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;
use crate::ws::{
    ChatSocketActor, ChatSocketArgs, ChatStatus, Connect, Disconnect, GetStatus, SendChat,
    Subscribe, Unsubscribe, actor_error,
};

/// Realtime chat client over a single STOMP-over-websocket connection.
///
/// Cheap to clone; every clone talks to the same connection actor. Inbound messages that are not
/// echoes of this client's own sends go to the handler passed at construction.
#[derive(Clone)]
pub struct ChatClient<T: WsTransport = TungsteniteTransport> {
    actor: ActorRef<ChatSocketActor<T>>,
}

impl ChatClient<TungsteniteTransport> {
    /// Client over the default tungstenite transport.
    pub fn new(
        config: ChatClientConfig,
        tokens: impl TokenProvider,
        handler: impl InboundHandler,
    ) -> Self {
        Self::with_transport(config, TungsteniteTransport::default(), tokens, handler)
    }
}

impl<T: WsTransport> ChatClient<T> {
    pub fn with_transport(
        config: ChatClientConfig,
        transport: T,
        tokens: impl TokenProvider,
        handler: impl InboundHandler,
    ) -> Self {
        let actor = ChatSocketActor::spawn(ChatSocketArgs {
            config,
            transport,
            tokens: Arc::new(tokens),
            handler: Box::new(handler),
        });
        Self { actor }
    }

    /// Open the connection and wait for the STOMP handshake.
    ///
    /// Returns `false` when the handshake fails (bad credentials, unreachable server, timeout);
    /// there is no automatic retry. Concurrent calls share one handshake, and calling it while
    /// connected returns `true` immediately.
    pub async fn connect(&self) -> bool {
        let waiter = match self.actor.ask(Connect).await {
            Ok(waiter) => waiter,
            Err(err) => {
                debug!(error = %actor_error("chat actor")(err), "connect not accepted");
                return false;
            }
        };
        waiter.await.unwrap_or(false)
    }

    /// Close the connection. Every pending send is rejected with [`ChatError::Disconnected`] and
    /// no handler call happens afterwards.
    pub async fn disconnect(&self) -> ChatResult<()> {
        self.actor
            .ask(Disconnect)
            .await
            .map_err(actor_error("chat actor"))
    }

    /// Subscribe to a conversation topic; a no-op when already subscribed.
    pub async fn subscribe_to_conversation(&self, conversation_id: i64) -> ChatResult<()> {
        self.actor
            .ask(Subscribe { conversation_id })
            .await
            .map_err(actor_error("chat actor"))
    }

    pub async fn unsubscribe_from_conversation(&self, conversation_id: i64) -> ChatResult<()> {
        self.actor
            .ask(Unsubscribe { conversation_id })
            .await
            .map_err(actor_error("chat actor"))
    }

    /// Publish `message` and wait for the server's echo of it.
    ///
    /// The echo is recognised by `(conversation_id, sender_id, content)`: two identical messages
    /// from the same sender in flight at once are settled oldest first, whichever echo that
    /// actually was. Fails with
    /// [`ChatError::SendTimeout`] when no echo arrives within the configured send timeout.
    pub async fn send_message(&self, message: OutgoingMessage) -> ChatResult<InboundMessage> {
        let echo = self
            .actor
            .ask(SendChat { message })
            .await
            .map_err(actor_error("chat actor"))?;
        echo.await
            .map_err(|_| ChatError::disconnected("chat actor dropped the pending send"))?
    }

    pub async fn status(&self) -> ChatResult<ChatStatus> {
        self.actor
            .ask(GetStatus)
            .await
            .map_err(actor_error("chat actor"))
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.status()
            .await
            .map(|status| status.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub async fn is_subscribed(&self, conversation_id: i64) -> bool {
        self.status()
            .await
            .map(|status| status.subscriptions.contains(&conversation_id))
            .unwrap_or(false)
    }

    /// Sends still waiting for their echo.
    pub async fn pending_sends(&self) -> usize {
        self.status()
            .await
            .map(|status| status.pending_sends)
            .unwrap_or(0)
    }

    /// Disconnect and stop the connection actor. The client is unusable afterwards.
    pub async fn shutdown(&self) {
        let _ = self.disconnect().await;
        let _ = self.actor.stop_gracefully().await;
        self.actor.wait_for_shutdown().await;
    }
}
