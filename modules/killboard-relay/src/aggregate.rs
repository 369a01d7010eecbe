//! Leaderboard aggregation over a window of events.
//!
//! Kill-side facets (killers, K/D, organizations, weapons, zones) count
//! kill records. Death-side facets count death records, except suicides,
//! which never appear in death totals or death-keyed rankings.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use killboard_common::config::LeaderboardConfig;
use killboard_common::{Anchor, Classifier, Event, EventKind, Normalizer, Period, Window};

use crate::leaderboard::{rank_kd, KdEntry, KdRatio, LeaderboardEntry, Tally};

/// Narrows the events a summary is computed over.
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    /// Keep events involving any of these handles. Empty keeps all.
    pub players: Vec<String>,
    /// Keep events of this game mode only.
    pub mode: Option<String>,
}

impl SummaryFilter {
    pub fn player(handle: &str) -> Self {
        Self {
            players: vec![handle.to_string()],
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.mode = mode.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        let player_ok = self.players.is_empty() || self.players.iter().any(|p| event.involves(p));
        let mode_ok = self
            .mode
            .as_deref()
            .map_or(true, |m| event.game_mode.eq_ignore_ascii_case(m));
        player_ok && mode_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub period: Period,
    pub window: Window,
    pub kills: u64,
    /// Non-suicide deaths.
    pub deaths: u64,
    pub kd: KdRatio,
    /// Distinct handles appearing as actor or subject.
    pub active_players: u64,
    pub top_killers: Vec<LeaderboardEntry>,
    pub top_victims: Vec<LeaderboardEntry>,
    pub top_kd: Vec<KdEntry>,
    pub top_organizations: Vec<LeaderboardEntry>,
    pub top_weapons: Vec<LeaderboardEntry>,
    pub top_zones: Vec<LeaderboardEntry>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.kills == 0 && self.deaths == 0 && self.active_players == 0
    }
}

/// Two summaries side by side, `left` minus `right` for the deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left_label: String,
    pub right_label: String,
    pub left: Summary,
    pub right: Summary,
}

impl Comparison {
    pub fn kill_delta(&self) -> i64 {
        self.left.kills as i64 - self.right.kills as i64
    }

    pub fn death_delta(&self) -> i64 {
        self.left.deaths as i64 - self.right.deaths as i64
    }

    pub fn active_delta(&self) -> i64 {
        self.left.active_players as i64 - self.right.active_players as i64
    }
}

pub fn compare(left_label: &str, left: Summary, right_label: &str, right: Summary) -> Comparison {
    Comparison {
        left_label: left_label.to_string(),
        right_label: right_label.to_string(),
        left,
        right,
    }
}

pub struct Aggregator {
    classifier: Classifier,
    normalizer: Normalizer,
    excluded_organizations: HashSet<String>,
    excluded_zones: HashSet<String>,
    top_n: usize,
    single_facet_top_n: usize,
}

impl Aggregator {
    pub fn new(classifier: Classifier, normalizer: Normalizer, config: &LeaderboardConfig) -> Self {
        Self {
            classifier,
            normalizer,
            excluded_organizations: lowercase_set(&config.excluded_organizations),
            excluded_zones: lowercase_set(&config.excluded_zones),
            top_n: config.top_n,
            single_facet_top_n: config.single_facet_top_n,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn single_facet_top_n(&self) -> usize {
        self.single_facet_top_n
    }

    /// Summarize every event in `period`'s window relative to `now`.
    pub fn summarize(&self, events: &[Event], period: Period, anchor: Anchor, now: DateTime<Utc>) -> Summary {
        self.summarize_filtered(events, period, anchor, now, &SummaryFilter::default(), self.top_n)
    }

    pub fn summarize_filtered(
        &self,
        events: &[Event],
        period: Period,
        anchor: Anchor,
        now: DateTime<Utc>,
        filter: &SummaryFilter,
        top_n: usize,
    ) -> Summary {
        let window = self.classifier.window(period, anchor, now);
        let in_scope = events.iter().filter(|e| {
            self.classifier.in_window(e.time, period, anchor, now) && filter.matches(e)
        });
        self.summarize_window(in_scope, period, window, top_n)
    }

    /// Summarize events already known to fall inside `window`, in input
    /// order.
    pub fn summarize_window<'a>(
        &self,
        events: impl IntoIterator<Item = &'a Event>,
        period: Period,
        window: Window,
        top_n: usize,
    ) -> Summary {
        let mut kills = 0u64;
        let mut deaths = 0u64;
        let mut killers = Tally::new();
        let mut victims = Tally::new();
        let mut organizations = Tally::new();
        let mut weapons = Tally::new();
        let mut zones = Tally::new();
        let mut players: HashSet<&str> = HashSet::new();

        for event in events {
            for handle in [event.actor.as_str(), event.subject.as_str()] {
                if !handle.is_empty() {
                    players.insert(handle);
                }
            }

            match event.kind {
                EventKind::Kill => {
                    kills += 1;
                    killers.add(&event.actor);
                    weapons.add(self.normalizer.weapon(&event.weapon));

                    let zone = self.normalizer.zone(&event.zone);
                    if !self.excluded_zones.contains(&zone.to_lowercase()) {
                        zones.add(zone);
                    }

                    let org = &event.organization.name;
                    if !self.excluded_organizations.contains(&org.to_lowercase()) {
                        organizations.add(org);
                    }
                }
                EventKind::Death => {
                    if event.is_suicide() {
                        continue;
                    }
                    deaths += 1;
                    victims.add(&event.subject);
                }
            }
        }

        Summary {
            period,
            window,
            kills,
            deaths,
            kd: KdRatio::compute(kills, deaths),
            active_players: players.len() as u64,
            top_killers: killers.top(top_n),
            top_victims: victims.top(top_n),
            top_kd: rank_kd(&killers, &victims, top_n),
            top_organizations: organizations.top(top_n),
            top_weapons: weapons.top(top_n),
            top_zones: zones.top(top_n),
        }
    }
}

fn lowercase_set(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}
