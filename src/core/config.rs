use std::env;
use std::time::Duration;

use super::types::{ChatError, ChatResult, WebSocketBufferConfig, WsTlsConfig};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection and protocol settings for a [`ChatClient`](crate::client::ChatClient).
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Websocket endpoint, e.g. `wss://club.example.com/ws`.
    pub url: String,
    /// Value of the STOMP `host` header sent with `CONNECT`.
    pub stomp_host: String,
    /// Application destination every send is published to.
    pub publish_destination: String,
    /// Global topic subscribed once per connection.
    pub broadcast_topic: String,
    /// Conversation topics are `<prefix><conversation_id>`.
    pub conversation_topic_prefix: String,
    /// How long a send waits for its echo before failing with `SendTimeout`.
    pub send_timeout: Duration,
    /// Upper bound for websocket open + STOMP `CONNECTED`.
    pub handshake_timeout: Duration,
    /// Cap on sends awaiting their echo at once.
    pub max_pending_sends: usize,
    pub ws_buffers: WebSocketBufferConfig,
    pub tls: WsTlsConfig,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            stomp_host: "localhost".to_string(),
            publish_destination: "/app/chat.sendMessage".to_string(),
            broadcast_topic: "/broadcast".to_string(),
            conversation_topic_prefix: "/conversation/".to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_pending_sends: 1024,
            ws_buffers: WebSocketBufferConfig::default(),
            tls: WsTlsConfig::default(),
        }
    }
}

impl ChatClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_stomp_host(mut self, host: impl Into<String>) -> Self {
        self.stomp_host = host.into();
        self
    }

    pub fn with_publish_destination(mut self, destination: impl Into<String>) -> Self {
        self.publish_destination = destination.into();
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_pending_sends(mut self, max: usize) -> Self {
        self.max_pending_sends = max.max(1);
        self
    }

    pub fn with_tls(mut self, tls: WsTlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Build from `CHAT_WS_*` environment variables, loading a `.env` file first if present.
    ///
    /// `CHAT_WS_URL` is required; everything else falls back to the defaults.
    pub fn from_env() -> ChatResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChatResult<Self> {
        let url = lookup("CHAT_WS_URL")
            .ok_or_else(|| ChatError::InvalidState("CHAT_WS_URL is not set".to_string()))?;
        let mut config = Self::new(url);

        if let Some(host) = lookup("CHAT_WS_STOMP_HOST") {
            config.stomp_host = host;
        }
        if let Some(dest) = lookup("CHAT_WS_PUBLISH_DESTINATION") {
            config.publish_destination = dest;
        }
        if let Some(ms) = lookup("CHAT_WS_SEND_TIMEOUT_MS") {
            config.send_timeout = parse_millis("CHAT_WS_SEND_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("CHAT_WS_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout = parse_millis("CHAT_WS_HANDSHAKE_TIMEOUT_MS", &ms)?;
        }
        if let Some(flag) = lookup("CHAT_WS_VALIDATE_CERTS") {
            config.tls.validate_certs = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ChatError::InvalidState(format!(
                        "CHAT_WS_VALIDATE_CERTS must be a boolean, got {other:?}"
                    )));
                }
            };
        }
        Ok(config)
    }
}

fn parse_millis(key: &str, raw: &str) -> ChatResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ChatError::InvalidState(format!("{key} must be milliseconds, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_chat_backend() {
        let config = ChatClientConfig::default();
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.broadcast_topic, "/broadcast");
        assert_eq!(config.conversation_topic_prefix, "/conversation/");
        assert!(config.tls.validate_certs);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ChatClientConfig::from_lookup(lookup(&[
            ("CHAT_WS_URL", "wss://club.example/ws"),
            ("CHAT_WS_SEND_TIMEOUT_MS", "2500"),
            ("CHAT_WS_PUBLISH_DESTINATION", "/app/send"),
            ("CHAT_WS_VALIDATE_CERTS", "false"),
        ]))
        .unwrap();
        assert_eq!(config.url, "wss://club.example/ws");
        assert_eq!(config.send_timeout, Duration::from_millis(2500));
        assert_eq!(config.publish_destination, "/app/send");
        assert!(!config.tls.validate_certs);
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn missing_url_and_bad_values_are_rejected() {
        assert!(matches!(
            ChatClientConfig::from_lookup(lookup(&[])),
            Err(ChatError::InvalidState(_))
        ));
        let err = ChatClientConfig::from_lookup(lookup(&[
            ("CHAT_WS_URL", "ws://x"),
            ("CHAT_WS_SEND_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHAT_WS_SEND_TIMEOUT_MS"));
    }
}
