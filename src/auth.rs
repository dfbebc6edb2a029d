//! Bearer-token source consulted once per `connect`.

/// Supplies the access token attached to the STOMP `CONNECT` frame.
///
/// The token is read once when a handshake starts and is not refreshed for the lifetime of that
/// connection. `None` connects without an `Authorization` header.
pub trait TokenProvider: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token, useful for service accounts and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_token_providers() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let provider = move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Some("abc".to_string())
        };
        assert_eq!(provider.access_token().as_deref(), Some("abc"));
        assert_eq!(reads.load(Ordering::Relaxed), 1);
        assert_eq!(StaticToken::none().access_token(), None);
    }
}
