use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use killboard_common::{Event, EventKind, Normalizer};

use crate::aggregate::{Comparison, Summary};
use crate::leaderboard::{KdEntry, LeaderboardEntry};
use crate::types::Message;

const KILL_COLOR: u32 = 0xC0392B;
const DEATH_COLOR: u32 = 0x7F8C8D;
const REPORT_COLOR: u32 = 0x2E86C1;

/// A single leaderboard view within a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Killers,
    Victims,
    KillDeath,
    Organizations,
    Weapons,
    Zones,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::Killers,
        Facet::Victims,
        Facet::KillDeath,
        Facet::Organizations,
        Facet::Weapons,
        Facet::Zones,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Killers => "Top Killers",
            Self::Victims => "Most Deaths",
            Self::KillDeath => "Top K/D",
            Self::Organizations => "Top Organizations",
            Self::Weapons => "Top Weapons",
            Self::Zones => "Top Zones",
        }
    }

    fn lines(&self, summary: &Summary) -> String {
        match self {
            Self::Killers => ranked(&summary.top_killers),
            Self::Victims => ranked(&summary.top_victims),
            Self::KillDeath => ranked_kd(&summary.top_kd),
            Self::Organizations => ranked(&summary.top_organizations),
            Self::Weapons => ranked(&summary.top_weapons),
            Self::Zones => ranked(&summary.top_zones),
        }
    }
}

fn discord_time(ts: DateTime<Utc>) -> String {
    format!("<t:{}:f>", ts.timestamp())
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}

fn ranked(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "No data".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("**{}.** {} ({})", i + 1, e.key, e.count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn ranked_kd(entries: &[KdEntry]) -> String {
    if entries.is_empty() {
        return "No data".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("**{}.** {} {:.2} ({}/{})", i + 1, e.player, e.ratio, e.kills, e.deaths))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Relay message for one newly arrived event.
pub fn event_message(event: &Event, channel: &str, normalizer: &Normalizer) -> Message {
    let (title, color) = match event.kind {
        EventKind::Kill => (format!("{} ➔ {}", event.actor, event.subject), KILL_COLOR),
        EventKind::Death if event.is_suicide() => (format!("{} died by their own hand", event.subject), DEATH_COLOR),
        EventKind::Death => (format!("{} was killed by {}", event.subject, event.actor), DEATH_COLOR),
    };

    let mut message = Message::new(channel, title)
        .color(color)
        .url(event.organization.url.clone())
        .field("Zone", or_unknown(normalizer.zone(&event.zone)), true)
        .field("Weapon", or_unknown(normalizer.weapon(&event.weapon)), true)
        .field("Damage", or_unknown(&event.damage_type), true);

    if !event.game_mode.is_empty() {
        message = message.field("Mode", event.game_mode.as_str(), true);
    }
    if !event.ship.is_empty() {
        message = message.field("Ship", event.ship.as_str(), true);
    }
    message = message
        .field("Organization", event.organization.name.as_str(), true)
        .field("Time", discord_time(event.time), false);

    if let Some(id) = event.id {
        message = message.description(format!("Kill #{id}"));
    }
    message
}

/// Full six-facet report.
pub fn summary_message(title: &str, summary: &Summary, channel: &str, tz: Tz) -> Message {
    let mut message = Message::new(channel, title)
        .color(REPORT_COLOR)
        .description(window_text(summary, tz))
        .field("Kills", summary.kills.to_string(), true)
        .field("Deaths", summary.deaths.to_string(), true)
        .field("K/D", summary.kd.to_string(), true)
        .field("Active Players", summary.active_players.to_string(), true);
    for facet in Facet::ALL {
        message = message.field(facet.title(), facet.lines(summary), false);
    }
    message
}

/// Dedicated report for one facet.
pub fn facet_message(title: &str, facet: Facet, summary: &Summary, channel: &str, tz: Tz) -> Message {
    Message::new(channel, format!("{title}: {}", facet.title()))
        .color(REPORT_COLOR)
        .description(window_text(summary, tz))
        .field(facet.title(), facet.lines(summary), false)
}

fn window_text(summary: &Summary, tz: Tz) -> String {
    if summary.period == killboard_common::Period::AllTime {
        return "All recorded history".to_string();
    }
    let fmt = "%Y-%m-%d %H:%M %Z";
    format!(
        "{} to {}",
        summary.window.start.with_timezone(&tz).format(fmt),
        summary.window.end.with_timezone(&tz).format(fmt),
    )
}

/// The last `limit` kills, newest first.
pub fn recent_kills_message(events: &[Event], limit: usize, channel: &str, normalizer: &Normalizer) -> Message {
    let mut kills: Vec<&Event> = events.iter().filter(|e| e.kind == EventKind::Kill).collect();
    kills.sort_by(|a, b| b.id.cmp(&a.id).then(b.time.cmp(&a.time)));
    kills.truncate(limit);

    let description = if kills.is_empty() {
        "No kills recorded yet.".to_string()
    } else {
        kills
            .iter()
            .map(|e| {
                format!(
                    "**{}** • {} ➔ {} • {} ({}, {})",
                    e.id.unwrap_or_default(),
                    e.actor,
                    e.subject,
                    discord_time(e.time),
                    or_unknown(normalizer.zone(&e.zone)),
                    or_unknown(normalizer.weapon(&e.weapon)),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    Message::new(channel, "Recent Kills")
        .color(KILL_COLOR)
        .description(description)
}

pub fn comparison_message(comparison: &Comparison, channel: &str) -> Message {
    let (left, right) = (&comparison.left, &comparison.right);
    let column = |s: &Summary| {
        format!(
            "Kills: {}\nDeaths: {}\nK/D: {}\nActive: {}",
            s.kills, s.deaths, s.kd, s.active_players
        )
    };
    Message::new(
        channel,
        format!(
            "{} vs {} ({})",
            comparison.left_label,
            comparison.right_label,
            left.period.label()
        ),
    )
    .color(REPORT_COLOR)
    .field(&comparison.left_label, column(left), true)
    .field(&comparison.right_label, column(right), true)
    .field(
        "Difference",
        format!(
            "Kills: {:+}\nDeaths: {:+}\nActive: {:+}",
            comparison.kill_delta(),
            comparison.death_delta(),
            comparison.active_delta()
        ),
        true,
    )
}
