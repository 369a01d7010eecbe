//! Near-real-time relay of new kills and deaths to the notifier.
//!
//! Each stream has a [`StreamCursor`] owned by the poller. A tick fetches
//! everything after the cursor, sorts by key, and walks forward: the cursor
//! moves past an event only once it has been delivered, deliberately
//! excluded, or given up on as malformed. Any failure ends the tick for that
//! stream and the next tick resumes from the same point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use killboard_common::config::{FileConfig, RelayConfig};
use killboard_common::{Event, EventKey, EventKind, Normalizer};

use crate::notify::NotifyBackend;
use crate::render;
use crate::state::StreamCursor;
use crate::traits::EventSource;
use crate::types::{RelayStats, TickStats};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Upper bound on every outbound call.
    pub call_timeout: Duration,
    pub excluded_subject_prefixes: Vec<String>,
    pub malformed_retry_cap: u32,
    pub kills_channel: String,
    pub deaths_channel: String,
}

impl PollerSettings {
    pub fn from_config(config: &FileConfig) -> Self {
        let relay = &config.relay;
        Self {
            interval: relay.poll_interval(),
            call_timeout: config.source.timeout(),
            excluded_subject_prefixes: relay.excluded_subject_prefixes.clone(),
            malformed_retry_cap: relay.malformed_retry_cap,
            kills_channel: relay.kills_channel.clone(),
            deaths_channel: relay.deaths_channel.clone(),
        }
    }

    fn channel(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Kill => &self.kills_channel,
            EventKind::Death => &self.deaths_channel,
        }
    }

    fn is_excluded(&self, subject: &str) -> bool {
        self.excluded_subject_prefixes
            .iter()
            .any(|prefix| subject.starts_with(prefix.as_str()))
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            interval: relay.poll_interval(),
            call_timeout: Duration::from_secs(10),
            excluded_subject_prefixes: relay.excluded_subject_prefixes,
            malformed_retry_cap: relay.malformed_retry_cap,
            kills_channel: relay.kills_channel,
            deaths_channel: relay.deaths_channel,
        }
    }
}

/// Run `fut` with a deadline, folding the elapsed case into an error.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{what} timed out after {}s", limit.as_secs_f32())),
    }
}

pub struct DeltaPoller {
    source: Arc<dyn EventSource>,
    notifier: Arc<dyn NotifyBackend>,
    normalizer: Normalizer,
    settings: PollerSettings,
    kills: StreamCursor,
    deaths: StreamCursor,
}

impl DeltaPoller {
    pub fn new(
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn NotifyBackend>,
        normalizer: Normalizer,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            normalizer,
            settings,
            kills: StreamCursor::new(EventKind::Kill),
            deaths: StreamCursor::new(EventKind::Death),
        }
    }

    pub fn cursor(&self, kind: EventKind) -> &StreamCursor {
        match kind {
            EventKind::Kill => &self.kills,
            EventKind::Death => &self.deaths,
        }
    }

    /// Seed both cursors from the current feed heads. A stream that fails
    /// to prime here is primed on its first successful tick instead.
    pub async fn prime(&mut self) -> RelayStats {
        let kills = self.prime_stream(EventKind::Kill).await;
        let deaths = self.prime_stream(EventKind::Death).await;
        RelayStats { kills, deaths }
    }

    async fn prime_stream(&mut self, kind: EventKind) -> TickStats {
        let cursor = match kind {
            EventKind::Kill => &mut self.kills,
            EventKind::Death => &mut self.deaths,
        };
        let mut stats = TickStats::default();
        if cursor.is_primed() {
            return stats;
        }

        match bounded(self.settings.call_timeout, "prime fetch", self.source.fetch(kind, None)).await {
            Ok(records) => {
                stats.fetched = records.len() as u64;
                let head = records.iter().filter_map(|r| EventKey::extract(kind, r)).max();
                cursor.prime(head);
                stats.primed = true;
            }
            Err(e) => {
                warn!(stream = %kind, error = %e, "Failed to prime cursor, will retry next tick");
                stats.fetch_failed = true;
            }
        }
        stats
    }

    /// One pass over both streams. Never fails: problems are logged and
    /// reflected in the returned stats.
    pub async fn tick(&mut self) -> RelayStats {
        let kills = self.tick_stream(EventKind::Kill).await;
        let deaths = self.tick_stream(EventKind::Death).await;
        RelayStats { kills, deaths }
    }

    async fn tick_stream(&mut self, kind: EventKind) -> TickStats {
        if !self.cursor(kind).is_primed() {
            return self.prime_stream(kind).await;
        }

        let cursor = match kind {
            EventKind::Kill => &mut self.kills,
            EventKind::Death => &mut self.deaths,
        };
        let settings = &self.settings;
        let mut stats = TickStats::default();

        let since = cursor.position().cloned();
        let records = match bounded(
            settings.call_timeout,
            "feed fetch",
            self.source.fetch(kind, since.as_ref()),
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(stream = %kind, error = %e, "Feed fetch failed, skipping tick");
                stats.fetch_failed = true;
                return stats;
            }
        };
        stats.fetched = records.len() as u64;

        let mut keyed: Vec<(EventKey, Value)> = Vec::with_capacity(records.len());
        for record in records {
            match EventKey::extract(kind, &record) {
                Some(key) => keyed.push((key, record)),
                None => {
                    stats.malformed += 1;
                    warn!(stream = %kind, record = %record, "Dropping record without a usable key");
                }
            }
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, record) in keyed {
            if cursor.is_seen(&key) {
                stats.duplicates += 1;
                continue;
            }

            let event = match Event::from_value(kind, record) {
                Ok(event) => event,
                Err(e) => {
                    stats.malformed += 1;
                    let attempts = cursor.record_malformed(key.clone());
                    if attempts >= settings.malformed_retry_cap {
                        error!(
                            stream = %kind, %key, attempts, error = %e,
                            "Record keeps failing to parse, skipping past it"
                        );
                        cursor.advance(key);
                        continue;
                    }
                    warn!(stream = %kind, %key, attempts, error = %e, "Malformed record, holding cursor");
                    break;
                }
            };

            if settings.is_excluded(&event.subject) {
                debug!(stream = %kind, %key, subject = %event.subject, "Excluded subject");
                stats.excluded += 1;
                cursor.advance(key);
                continue;
            }

            let message = render::event_message(&event, settings.channel(kind), &self.normalizer);
            match bounded(settings.call_timeout, "delivery", self.notifier.send(&message)).await {
                Ok(()) => {
                    cursor.advance(key);
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(stream = %kind, %key, error = %e, "Delivery failed, will retry from this event");
                    stats.delivery_failed = true;
                    break;
                }
            }
        }

        stats
    }

    /// Tick on a fixed interval until `shutdown` flips to true. A tick that
    /// overruns the interval causes the missed ticks to be skipped; a tick in
    /// progress always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            "Delta poller running"
        );
        let mut timer = interval(self.settings.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let stats = self.tick().await;
                    if stats.is_quiet() {
                        debug!("Relay tick: {stats}");
                    } else {
                        info!("Relay tick: {stats}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Delta poller stopping");
                        break;
                    }
                }
            }
        }
    }
}
