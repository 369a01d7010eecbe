use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use killboard_common::{Anchor, Event, EventKind, Period};

use crate::aggregate::{compare, Aggregator, Comparison, Summary, SummaryFilter};
use crate::notify::NotifyBackend;
use crate::poller::bounded;
use crate::render::{self, Facet};
use crate::traits::EventSource;
use crate::types::Message;

/// Number of kills shown by the recent-kills listing.
pub const RECENT_KILLS: usize = 5;

/// Parse a batch of raw records, skipping (and logging) the ones that fail.
pub fn parse_records(kind: EventKind, records: Vec<Value>) -> Vec<Event> {
    let total = records.len();
    let events: Vec<Event> = records
        .into_iter()
        .filter_map(|record| match Event::from_value(kind, record) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(stream = %kind, error = %e, "Skipping malformed record in report input");
                None
            }
        })
        .collect();
    if events.len() < total {
        warn!(stream = %kind, skipped = total - events.len(), "Some records were not usable");
    }
    events
}

/// Builds and optionally publishes leaderboard reports. Shared by the
/// scheduler and on-demand callers; holds no mutable state.
pub struct ReportService {
    source: Arc<dyn EventSource>,
    notifier: Arc<dyn NotifyBackend>,
    aggregator: Aggregator,
    call_timeout: Duration,
}

impl ReportService {
    pub fn new(
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn NotifyBackend>,
        aggregator: Aggregator,
        call_timeout: Duration,
    ) -> Self {
        Self {
            source,
            notifier,
            aggregator,
            call_timeout,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Full history of both streams, kills first, each in feed order.
    pub async fn load_events(&self) -> Result<Vec<Event>> {
        let (kills, deaths) = tokio::try_join!(
            bounded(self.call_timeout, "kills fetch", self.source.fetch(EventKind::Kill, None)),
            bounded(self.call_timeout, "deaths fetch", self.source.fetch(EventKind::Death, None)),
        )?;
        let mut events = parse_records(EventKind::Kill, kills);
        events.extend(parse_records(EventKind::Death, deaths));
        Ok(events)
    }

    pub async fn summary(
        &self,
        period: Period,
        anchor: Anchor,
        filter: &SummaryFilter,
        now: DateTime<Utc>,
    ) -> Result<Summary> {
        let events = self.load_events().await?;
        Ok(self.aggregator.summarize_filtered(
            &events,
            period,
            anchor,
            now,
            filter,
            self.aggregator.top_n(),
        ))
    }

    /// Single-facet report, ranked deeper than the full report.
    pub async fn facet(
        &self,
        facet: Facet,
        period: Period,
        anchor: Anchor,
        filter: &SummaryFilter,
        now: DateTime<Utc>,
        channel: &str,
    ) -> Result<Message> {
        let events = self.load_events().await?;
        let summary = self.aggregator.summarize_filtered(
            &events,
            period,
            anchor,
            now,
            filter,
            self.aggregator.single_facet_top_n(),
        );
        Ok(render::facet_message(
            &format!("{} Report", period.label()),
            facet,
            &summary,
            channel,
            self.aggregator.classifier().timezone(),
        ))
    }

    /// Head-to-head comparison of two players over the same window.
    pub async fn compare_players(
        &self,
        left: &str,
        right: &str,
        period: Period,
        mode: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Comparison> {
        let events = self.load_events().await?;
        let top_n = self.aggregator.top_n();
        let summarize = |handle: &str| {
            let filter = SummaryFilter::player(handle).with_mode(mode.clone());
            self.aggregator
                .summarize_filtered(&events, period, Anchor::Current, now, &filter, top_n)
        };
        Ok(compare(left, summarize(left), right, summarize(right)))
    }

    /// This period against the one before it. All-time has no predecessor.
    pub async fn compare_periods(&self, period: Period, now: DateTime<Utc>) -> Result<Comparison> {
        if period == Period::AllTime {
            bail!("{period} has no previous period to compare against");
        }
        let events = self.load_events().await?;
        let current = self.aggregator.summarize(&events, period, Anchor::Current, now);
        let previous = self.aggregator.summarize(&events, period, Anchor::Completed, now);
        Ok(compare("Current", current, "Previous", previous))
    }

    pub async fn recent_kills(&self, channel: &str) -> Result<Message> {
        let records = bounded(
            self.call_timeout,
            "kills fetch",
            self.source.fetch(EventKind::Kill, None),
        )
        .await?;
        let events = parse_records(EventKind::Kill, records);
        Ok(render::recent_kills_message(
            &events,
            RECENT_KILLS,
            channel,
            self.aggregator.normalizer(),
        ))
    }

    /// Build the report for the most recently completed `period` and send it.
    pub async fn publish(&self, name: &str, period: Period, channel: &str, now: DateTime<Utc>) -> Result<Summary> {
        let summary = self
            .summary(period, Anchor::Completed, &SummaryFilter::default(), now)
            .await?;
        let message = render::summary_message(
            &format!("{} Report", period.label()),
            &summary,
            channel,
            self.aggregator.classifier().timezone(),
        );
        bounded(self.call_timeout, "report delivery", self.notifier.send(&message)).await?;
        info!(
            trigger = name,
            period = %period,
            kills = summary.kills,
            deaths = summary.deaths,
            active = summary.active_players,
            "Report published"
        );
        Ok(summary)
    }
}
