use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience result alias for chat transport operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Canonical error surface of the chat transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// An operation other than `connect` was attempted outside the `Connected` state.
    #[error("Not connected: cannot {operation} while {state}")]
    NotConnected {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Send timed out: no echo for conversation {conversation_id} within {timeout:?}")]
    SendTimeout {
        conversation_id: i64,
        timeout: Duration,
    },

    #[error("Backpressure: {max} sends already awaiting their echo")]
    TooManyPending { max: usize },

    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Transport error ({context}): {error}")]
    TransportError {
        context: &'static str,
        error: String,
    },

    #[error("Timeout: {context}")]
    Timeout { context: String },

    #[error("Actor error: {0}")]
    ActorError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ChatError {
    #[inline]
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn transport(context: &'static str, err: impl ToString) -> Self {
        Self::TransportError {
            context,
            error: err.to_string(),
        }
    }
}

/// Lifecycle of the single underlying connection.
///
/// There is no self-transition from `Failed` back to `Connecting`: only an explicit `connect`
/// starts a new handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a live connection was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// `disconnect` was called by the owner.
    Requested,
    RemoteClosed { reason: String },
    ReadFailure { error: String },
    WriteFailure { error: String },
    /// The broker sent a STOMP `ERROR` frame on an established session.
    ServerError { message: String },
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectCause::Requested => f.write_str("disconnect requested"),
            DisconnectCause::RemoteClosed { reason } => write!(f, "remote closed ({reason})"),
            DisconnectCause::ReadFailure { error } => write!(f, "read failure: {error}"),
            DisconnectCause::WriteFailure { error } => write!(f, "write failure: {error}"),
            DisconnectCause::ServerError { message } => write!(f, "server error: {message}"),
        }
    }
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        // Chat frames are small; attachments travel as URLs, not inline payloads.
        Self {
            write_buffer_bytes: 64 << 10,
            max_write_buffer_bytes: 256 << 10,
            max_message_bytes: 4 * 1024 * 1024,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

/// TLS configuration for websocket connections.
///
/// Certificate validation is enabled unless explicitly disabled for development setups.
#[derive(Clone, Copy, Debug)]
pub struct WsTlsConfig {
    pub validate_certs: bool,
}

impl Default for WsTlsConfig {
    fn default() -> Self {
        Self {
            validate_certs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_error_names_operation_and_state() {
        let err = ChatError::NotConnected {
            operation: "subscribe",
            state: ConnectionState::Failed,
        };
        assert_eq!(
            err.to_string(),
            "Not connected: cannot subscribe while failed"
        );
    }

    #[test]
    fn send_timeout_is_descriptive() {
        let err = ChatError::SendTimeout {
            conversation_id: 42,
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("conversation 42"));
        assert!(err.to_string().contains("10s"));
    }
}
