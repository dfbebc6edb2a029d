//! Realtime chat transport over STOMP-over-websocket, built on kameo actors.
//!
//! One [`ChatClient`] multiplexes a single connection across many conversation topics, correlates
//! each send with the server's echo of it, and hands every other inbound message to one
//! [`InboundHandler`].

pub mod auth;
pub mod client;
pub mod core;
pub mod handler;
pub mod testing;
pub mod tls;
pub mod transport;
pub mod ws;

pub use auth::{StaticToken, TokenProvider};
pub use client::ChatClient;
pub use crate::core::{
    Attachment, ChatClientConfig, ChatError, ChatResult, ConnectionState, InboundMessage,
    OutgoingMessage,
};
pub use handler::InboundHandler;
pub use ws::ChatStatus;
