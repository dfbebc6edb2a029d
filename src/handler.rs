use crate::core::InboundMessage;

/// The single consumer of inbound chat traffic.
///
/// Receives every `MESSAGE` on a live subscription that was not consumed as the echo of a pending
/// send, in transport delivery order. Called from inside the chat actor, so implementations must
/// not block; hand heavy work off to a channel.
pub trait InboundHandler: Send + 'static {
    fn on_message(&mut self, message: InboundMessage);
}

impl<F> InboundHandler for F
where
    F: FnMut(InboundMessage) + Send + 'static,
{
    fn on_message(&mut self, message: InboundMessage) {
        self(message)
    }
}
