// Test doubles for the relay.
//
// Two mocks matching the two trait boundaries:
// - MemorySource (EventSource): in-memory feeds with injectable failures
// - RecordingSink (NotifyBackend): records messages, can fail on demand
//
// Plus helpers for building raw feed records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use killboard_common::{EventKey, EventKind};

use crate::notify::NotifyBackend;
use crate::traits::EventSource;
use crate::types::Message;

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory feeds. Honors `since` like a range-capable backend unless
/// built with `.ignoring_since()`.
pub struct MemorySource {
    feeds: Mutex<HashMap<EventKind, Vec<Value>>>,
    failures: Mutex<HashMap<EventKind, u32>>,
    calls: Mutex<Vec<(EventKind, Option<EventKey>)>>,
    honour_since: bool,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            honour_since: true,
            gate: None,
        }
    }

    pub fn with_records(self, kind: EventKind, records: Vec<Value>) -> Self {
        self.feeds.lock().unwrap().entry(kind).or_default().extend(records);
        self
    }

    /// Return the whole feed on every call, like a backend without range
    /// queries.
    pub fn ignoring_since(mut self) -> Self {
        self.honour_since = false;
        self
    }

    /// Every fetch waits for a permit from `release`.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    /// Append to a feed after construction.
    pub fn push(&self, kind: EventKind, record: Value) {
        self.feeds.lock().unwrap().entry(kind).or_default().push(record);
    }

    /// Make the next `n` fetches of `kind` fail.
    pub fn fail_next(&self, kind: EventKind, n: u32) {
        self.failures.lock().unwrap().insert(kind, n);
    }

    /// Every `since` value this source was asked for, in order.
    pub fn calls(&self) -> Vec<(EventKind, Option<EventKey>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn fetch(&self, kind: EventKind, since: Option<&EventKey>) -> Result<Vec<Value>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        self.calls.lock().unwrap().push((kind, since.cloned()));

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&kind) {
                if *remaining > 0 {
                    *remaining -= 1;
                    bail!("MemorySource: injected {kind} fetch failure");
                }
            }
        }

        let feeds = self.feeds.lock().unwrap();
        let records = feeds.get(&kind).cloned().unwrap_or_default();
        match (since, self.honour_since) {
            (Some(since), true) => Ok(records
                .into_iter()
                // Records without a key are passed through so callers see them.
                .filter(|r| EventKey::extract(kind, r).map_or(true, |k| &k > since))
                .collect()),
            _ => Ok(records),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Records every delivered message. `.fail_next(n)` rejects the next `n`.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Message>>,
    failures: AtomicU32,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.title).collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotifyBackend for RecordingSink {
    async fn send(&self, message: &Message) -> Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            bail!("RecordingSink: injected delivery failure");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

pub fn kill_record(id: i64, player: &str, victim: &str, time: &str) -> Value {
    json!({
        "id": id,
        "player": player,
        "victim": victim,
        "time": time,
        "zone": "OOC_Stanton_2b_Daymar",
        "weapon": "behr_rifle_ballistic_01",
        "damage_type": "Bullet",
        "game_mode": "SC_Default",
        "organization_name": "Crimson Fleet",
    })
}

pub fn death_record(player: &str, victim: &str, time: &str, damage_type: &str) -> Value {
    json!({
        "player": player,
        "victim": victim,
        "time": time,
        "zone": "OOC_Stanton_1_Hurston",
        "weapon": "ksar_shotgun_energy_01",
        "damageType": damage_type,
        "mode": "SC_Default",
    })
}
