use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Body of `POST /reportKill`.
#[derive(Debug, Clone, Serialize)]
pub struct NewKill {
    pub player: String,
    pub victim: String,
    pub zone: String,
    pub weapon: String,
    pub damage_type: String,
    /// ISO-8601 timestamp; the client fills in "now" when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl NewKill {
    pub fn new(player: &str, victim: &str, zone: &str, weapon: &str, damage_type: &str) -> Self {
        Self {
            player: player.to_string(),
            victim: victim.to_string(),
            zone: zone.to_string(),
            weapon: weapon.to_string(),
            damage_type: damage_type.to_string(),
            time: None,
        }
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time.to_rfc3339_opts(SecondsFormat::Micros, true));
        self
    }

    /// Copy with `time` set, defaulting to `now`.
    pub(crate) fn stamped(&self, now: DateTime<Utc>) -> Self {
        match self.time {
            Some(_) => self.clone(),
            None => self.clone().at(now),
        }
    }
}
