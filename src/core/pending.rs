use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use tokio::time::Instant;

use super::message::InboundMessage;

/// FNV-1a over the message content; a cheap prefilter before the exact string comparison.
#[inline]
pub fn content_fingerprint(content: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in content.as_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// One-shot echo listener for a send that has been published but not yet acknowledged.
#[derive(Debug)]
pub struct PendingSend<W> {
    pub send_id: u64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub fingerprint: u64,
    pub content: String,
    pub deadline: Instant,
    pub waiter: W,
}

impl<W> PendingSend<W> {
    #[inline]
    fn matches(&self, topic: i64, msg: &InboundMessage, fingerprint: u64) -> bool {
        self.conversation_id == topic
            && self.conversation_id == msg.conversation_id
            && self.sender_id == msg.sender_id
            && self.fingerprint == fingerprint
            && self.content == msg.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DeadlineItem {
    deadline: Instant,
    send_id: u64,
}

/// Table of in-flight sends awaiting their echo.
///
/// Every entry leaves the table exactly once: through [`take_match`](Self::take_match),
/// [`expire_due`](Self::expire_due) or [`drain`](Self::drain). Entries are kept in send order so
/// that an echo completes the oldest matching send.
#[derive(Debug)]
pub struct PendingSendTable<W> {
    max_pending: usize,
    next_id: u64,
    entries: BTreeMap<u64, PendingSend<W>>,
    deadlines: BinaryHeap<Reverse<DeadlineItem>>,
}

impl<W> PendingSendTable<W> {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            next_id: 0,
            entries: BTreeMap::new(),
            deadlines: BinaryHeap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a listener. Hands the waiter back when the table is at capacity.
    pub fn insert(
        &mut self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
        deadline: Instant,
        waiter: W,
    ) -> Result<u64, W> {
        if self.entries.len() >= self.max_pending {
            return Err(waiter);
        }
        let send_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(
            send_id,
            PendingSend {
                send_id,
                conversation_id,
                sender_id,
                fingerprint: content_fingerprint(content),
                content: content.to_string(),
                deadline,
                waiter,
            },
        );
        self.deadlines.push(Reverse(DeadlineItem { deadline, send_id }));
        Ok(send_id)
    }

    /// Remove a listener without completing it (e.g. the publish itself failed).
    pub fn remove(&mut self, send_id: u64) -> Option<PendingSend<W>> {
        self.entries.remove(&send_id)
    }

    /// Consume the oldest listener on conversation `topic` whose `(sender, content)` matches
    /// `msg`. `topic` is the conversation the frame was routed to, not the one named in its body.
    pub fn take_match(&mut self, topic: i64, msg: &InboundMessage) -> Option<PendingSend<W>> {
        if self.entries.is_empty() {
            return None;
        }
        let fingerprint = content_fingerprint(&msg.content);
        let send_id = self
            .entries
            .values()
            .find(|entry| entry.matches(topic, msg, fingerprint))
            .map(|entry| entry.send_id)?;
        self.entries.remove(&send_id)
    }

    /// Earliest deadline among live entries; drives the single expiry timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(item)) = self.deadlines.peek().copied() {
            if self.entries.contains_key(&item.send_id) {
                return Some(item.deadline);
            }
            // Stale heap item: the entry already matched or was drained.
            let _ = self.deadlines.pop();
        }
        None
    }

    /// Remove and return every listener whose deadline is at or before `now`.
    pub fn expire_due(&mut self, now: Instant) -> Vec<PendingSend<W>> {
        let mut out = Vec::new();
        while let Some(Reverse(item)) = self.deadlines.peek().copied() {
            if item.deadline > now {
                break;
            }
            let _ = self.deadlines.pop();
            if let Some(entry) = self.entries.remove(&item.send_id) {
                out.push(entry);
            }
        }
        out
    }

    /// Remove every listener (connection teardown), oldest first.
    pub fn drain(&mut self) -> Vec<PendingSend<W>> {
        self.deadlines.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}
