use std::collections::HashMap;

use tracing::info;

use killboard_common::{EventKey, EventKind};

/// High-water mark for one stream: the largest key already forwarded (or
/// deliberately stepped over). Owned by the poller and never shared.
#[derive(Debug)]
pub struct StreamCursor {
    kind: EventKind,
    position: Option<EventKey>,
    primed: bool,
    /// Parse failures per key still ahead of the cursor.
    malformed: HashMap<EventKey, u32>,
}

impl StreamCursor {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            position: None,
            primed: false,
            malformed: HashMap::new(),
        }
    }

    pub fn position(&self) -> Option<&EventKey> {
        self.position.as_ref()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Seed from the current head of the feed so existing history is not
    /// replayed. `None` means the feed was empty.
    pub fn prime(&mut self, head: Option<EventKey>) {
        self.position = self.position.take().max(head);
        self.primed = true;
        info!(stream = %self.kind, head = ?self.position, "Cursor primed");
    }

    /// True if `key` is at or behind the cursor.
    pub fn is_seen(&self, key: &EventKey) -> bool {
        self.position.as_ref().is_some_and(|p| key <= p)
    }

    /// Move forward to `key`. Never moves backwards. Returns whether the
    /// cursor moved.
    pub fn advance(&mut self, key: EventKey) -> bool {
        if self.is_seen(&key) {
            return false;
        }
        self.malformed.retain(|k, _| *k > key);
        self.position = Some(key);
        true
    }

    /// Record one failed parse of the record at `key`; returns the number
    /// of failures so far.
    pub fn record_malformed(&mut self, key: EventKey) -> u32 {
        let attempts = self.malformed.entry(key).or_insert(0);
        *attempts += 1;
        *attempts
    }
}
