use std::collections::HashMap;

/// Where an inbound `MESSAGE` frame belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Broadcast,
    Conversation(i64),
}

/// A live conversation subscription. `handle` is the STOMP subscription id and is the only
/// token needed to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub conversation_id: i64,
    pub handle: String,
    pub destination: String,
}

/// Arena of live subscriptions, keyed by conversation id.
///
/// Holds at most one subscription per conversation; `subscribe` on a live id returns `None` and
/// changes nothing. The broadcast subscription is tracked separately since it lives for the whole
/// connection.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    topic_prefix: String,
    next_id: u64,
    broadcast: Option<(String, String)>,
    conversations: HashMap<i64, Subscription>,
    handles: HashMap<String, SubscriptionTarget>,
}

impl SubscriptionRegistry {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            next_id: 0,
            broadcast: None,
            conversations: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    fn allocate_handle(&mut self) -> String {
        let handle = format!("sub-{}", self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        handle
    }

    pub fn destination_for(&self, conversation_id: i64) -> String {
        format!("{}{}", self.topic_prefix, conversation_id)
    }

    /// Record the broadcast subscription; returns its handle, or `None` if it already exists.
    pub fn subscribe_broadcast(&mut self, destination: &str) -> Option<String> {
        if self.broadcast.is_some() {
            return None;
        }
        let handle = self.allocate_handle();
        self.handles.insert(handle.clone(), SubscriptionTarget::Broadcast);
        self.broadcast = Some((handle.clone(), destination.to_string()));
        Some(handle)
    }

    /// Record a new conversation subscription.
    ///
    /// Returns the created subscription, or `None` when one is already live for the id.
    pub fn subscribe(&mut self, conversation_id: i64) -> Option<Subscription> {
        if self.conversations.contains_key(&conversation_id) {
            return None;
        }
        let handle = self.allocate_handle();
        let sub = Subscription {
            conversation_id,
            handle: handle.clone(),
            destination: self.destination_for(conversation_id),
        };
        self.handles
            .insert(handle, SubscriptionTarget::Conversation(conversation_id));
        self.conversations.insert(conversation_id, sub.clone());
        Some(sub)
    }

    /// Release the subscription for `conversation_id`, returning it if it was live.
    pub fn unsubscribe(&mut self, conversation_id: i64) -> Option<Subscription> {
        let sub = self.conversations.remove(&conversation_id)?;
        self.handles.remove(&sub.handle);
        Some(sub)
    }

    /// Forget every subscription (connection teardown). Returns how many conversation
    /// subscriptions were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.conversations.len();
        self.conversations.clear();
        self.handles.clear();
        self.broadcast = None;
        dropped
    }

    #[inline]
    pub fn is_subscribed(&self, conversation_id: i64) -> bool {
        self.conversations.contains_key(&conversation_id)
    }

    /// Conversation ids with a live subscription, ascending.
    pub fn conversation_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.conversations.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Resolve an inbound frame to its subscription.
    ///
    /// A `subscription` header is authoritative: an unknown or released handle resolves to `None`
    /// even when the destination is live again under a newer handle. Only frames without the
    /// header are routed by destination.
    pub fn route(
        &self,
        handle: Option<&str>,
        destination: Option<&str>,
    ) -> Option<SubscriptionTarget> {
        if let Some(handle) = handle {
            return self.handles.get(handle).copied();
        }
        let destination = destination?;
        if let Some((_, broadcast)) = self.broadcast.as_ref() {
            if broadcast == destination {
                return Some(SubscriptionTarget::Broadcast);
            }
        }
        let id = destination
            .strip_prefix(self.topic_prefix.as_str())?
            .parse::<i64>()
            .ok()?;
        self.conversations
            .contains_key(&id)
            .then_some(SubscriptionTarget::Conversation(id))
    }
}
