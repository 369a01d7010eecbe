use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::KillboardError;

/// Sentinel organization name for records that carry none.
pub const UNKNOWN_ORGANIZATION: &str = "Unknown";

/// Damage type marking a self-inflicted death.
pub const SUICIDE_DAMAGE: &str = "Suicide";

// ---------------------------------------------------------------------------
// EventKind, which also names the stream an event was read from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Kill,
    Death,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Kill, EventKind::Death];

    /// Backend path segment for this stream.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Kill => "kills",
            Self::Death => "deaths",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kill => write!(f, "kill"),
            Self::Death => write!(f, "death"),
        }
    }
}

/// A backend feed, named by the kind of event it carries.
pub type Stream = EventKind;

// ---------------------------------------------------------------------------
// EventKey: dedup and ordering key
// ---------------------------------------------------------------------------

/// Ordering key of an event within its stream.
///
/// Kills are keyed by their integer `id`. Deaths are keyed by `time`, since
/// some backend revisions emit death records without a usable id; the
/// killer and victim handles break ties between deaths sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKey {
    Id(i64),
    Time {
        at: DateTime<Utc>,
        actor: String,
        subject: String,
    },
}

impl EventKey {
    /// Read only the key of a raw record. Works on records whose remaining
    /// fields fail to parse, so the poller can still step over them.
    pub fn extract(kind: EventKind, record: &Value) -> Option<Self> {
        match kind {
            EventKind::Kill => record.get("id").and_then(id_from_value).map(Self::Id),
            EventKind::Death => {
                let at = record
                    .get("time")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)?;
                Some(Self::death(
                    at,
                    handle_of(record, &["player", "killer"]),
                    handle_of(record, &["victim"]),
                ))
            }
        }
    }

    pub fn death(at: DateTime<Utc>, actor: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::Time {
            at,
            actor: actor.into(),
            subject: subject.into(),
        }
    }

    /// Query parameter the backend uses for "strictly after this key".
    pub fn query_param(&self) -> (&'static str, String) {
        match self {
            Self::Id(id) => ("since", id.to_string()),
            Self::Time { at, .. } => ("since_time", at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Time { at, actor, subject } => write!(
                f,
                "time:{} ({actor} > {subject})",
                at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        }
    }
}

// Missing handles key as empty strings so broken records still order.
fn handle_of(record: &Value, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| record.get(*name).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn id_from_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Parse a backend timestamp. Zone-qualified RFC 3339 strings keep their
/// offset; naive ISO-8601 strings are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|ndt| ndt.and_utc())
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    pub url: Option<String>,
}

impl Organization {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_ORGANIZATION.to_string(),
            url: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_ORGANIZATION
    }
}

/// A kill or death reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Option<i64>,
    pub kind: EventKind,
    pub time: DateTime<Utc>,
    /// Killer handle.
    pub actor: String,
    /// Victim handle.
    pub subject: String,
    pub zone: String,
    pub weapon: String,
    pub damage_type: String,
    pub game_mode: String,
    pub ship: String,
    pub organization: Organization,
}

/// Wire shape shared by both streams. Field aliases cover the naming used
/// across backend revisions.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<i64>,
    #[serde(alias = "killer")]
    player: String,
    victim: String,
    time: String,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    weapon: Option<String>,
    #[serde(default, alias = "damageType")]
    damage_type: Option<String>,
    #[serde(default, alias = "gameMode", alias = "mode")]
    game_mode: Option<String>,
    #[serde(default)]
    ship: Option<String>,
    #[serde(default, alias = "organizationName")]
    organization_name: Option<String>,
    #[serde(default, alias = "organizationUrl")]
    organization_url: Option<String>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl Event {
    /// Parse one backend record of the given stream.
    pub fn from_value(kind: EventKind, record: Value) -> Result<Self, KillboardError> {
        let raw: RawEvent =
            serde_json::from_value(record).map_err(|e| KillboardError::Malformed(e.to_string()))?;

        let time = parse_timestamp(&raw.time)
            .ok_or_else(|| KillboardError::Malformed(format!("unparseable time {:?}", raw.time)))?;

        if kind == EventKind::Kill && raw.id.is_none() {
            return Err(KillboardError::Malformed("kill record without id".to_string()));
        }

        let organization = match non_empty(raw.organization_name) {
            Some(name) => Organization {
                name,
                url: non_empty(raw.organization_url),
            },
            None => Organization::unknown(),
        };

        Ok(Self {
            id: raw.id,
            kind,
            time,
            actor: raw.player,
            subject: raw.victim,
            zone: raw.zone.unwrap_or_default(),
            weapon: raw.weapon.unwrap_or_default(),
            damage_type: raw.damage_type.unwrap_or_default(),
            game_mode: raw.game_mode.unwrap_or_default(),
            ship: raw.ship.unwrap_or_default(),
            organization,
        })
    }

    /// The dedup key of this event within its stream.
    pub fn key(&self) -> Option<EventKey> {
        match self.kind {
            EventKind::Kill => self.id.map(EventKey::Id),
            EventKind::Death => Some(EventKey::death(self.time, self.actor.as_str(), self.subject.as_str())),
        }
    }

    pub fn is_suicide(&self) -> bool {
        self.damage_type.eq_ignore_ascii_case(SUICIDE_DAMAGE)
    }

    /// True if `handle` is the killer or the victim.
    pub fn involves(&self, handle: &str) -> bool {
        self.actor.eq_ignore_ascii_case(handle) || self.subject.eq_ignore_ascii_case(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn naive_timestamp_is_utc() {
        let ts = parse_timestamp("2024-03-15T03:30:00.123456").unwrap();
        assert_eq!(
            ts,
            Utc.with_ymd_and_hms(2024, 3, 15, 3, 30, 0).unwrap()
                + chrono::Duration::microseconds(123_456)
        );
    }

    #[test]
    fn zoned_timestamp_keeps_offset() {
        let ts = parse_timestamp("2024-03-15T23:30:00-04:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 16, 3, 30, 0).unwrap());
    }

    #[test]
    fn garbage_timestamp_rejected() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn kill_record_parses_with_aliases() {
        let event = Event::from_value(
            EventKind::Kill,
            json!({
                "id": 7,
                "player": "Alpha",
                "victim": "Bravo",
                "time": "2024-03-15T12:00:00Z",
                "zone": "OOC_Stanton_2_Crusader",
                "weapon": "behr_rifle_ballistic_01",
                "damageType": "Bullet",
                "gameMode": "SC_Default",
                "organizationName": "Crimson Fleet",
                "organizationUrl": "https://example.com/orgs/CRIMSON"
            }),
        )
        .unwrap();

        assert_eq!(event.id, Some(7));
        assert_eq!(event.actor, "Alpha");
        assert_eq!(event.subject, "Bravo");
        assert_eq!(event.damage_type, "Bullet");
        assert_eq!(event.game_mode, "SC_Default");
        assert_eq!(event.organization.name, "Crimson Fleet");
        assert_eq!(event.key(), Some(EventKey::Id(7)));
    }

    #[test]
    fn missing_organization_is_unknown() {
        let event = Event::from_value(
            EventKind::Death,
            json!({"player": "X", "victim": "Y", "time": "2024-01-01T00:00:00", "organization_name": "  "}),
        )
        .unwrap();
        assert!(event.organization.is_unknown());
        assert_eq!(event.id, None);
        assert_eq!(event.key(), Some(EventKey::death(event.time, "X", "Y")));
    }

    #[test]
    fn kill_without_id_is_malformed() {
        let err = Event::from_value(
            EventKind::Kill,
            json!({"player": "X", "victim": "Y", "time": "2024-01-01T00:00:00"}),
        )
        .unwrap_err();
        assert!(matches!(err, KillboardError::Malformed(_)));
    }

    #[test]
    fn key_extracts_from_otherwise_broken_record() {
        let record = json!({"id": "42", "time": 17});
        assert_eq!(EventKey::extract(EventKind::Kill, &record), Some(EventKey::Id(42)));
        assert_eq!(EventKey::extract(EventKind::Death, &record), None);
        assert!(Event::from_value(EventKind::Kill, record).is_err());
    }

    #[test]
    fn simultaneous_deaths_get_distinct_keys() {
        let first = json!({"player": "X", "victim": "Me", "time": "2024-05-01T12:00:05Z"});
        let second = json!({"killer": "X", "victim": "Buddy", "time": "2024-05-01T12:00:05Z"});
        let a = EventKey::extract(EventKind::Death, &first).unwrap();
        let b = EventKey::extract(EventKind::Death, &second).unwrap();
        assert_ne!(a, b);
        // Time still dominates the ordering.
        let later = json!({"player": "A", "victim": "A", "time": "2024-05-01T12:00:06Z"});
        assert!(EventKey::extract(EventKind::Death, &later).unwrap() > a.clone().max(b.clone()));
        // The extracted key agrees with the parsed event's key.
        assert_eq!(Event::from_value(EventKind::Death, second).unwrap().key(), Some(b));
    }

    #[test]
    fn suicide_detection_ignores_case() {
        let mut event = Event::from_value(
            EventKind::Death,
            json!({"player": "X", "victim": "X", "time": "2024-01-01T00:00:00", "damage_type": "suicide"}),
        )
        .unwrap();
        assert!(event.is_suicide());
        event.damage_type = "Crash".to_string();
        assert!(!event.is_suicide());
    }

    #[test]
    fn query_param_per_key_kind() {
        assert_eq!(EventKey::Id(9).query_param(), ("since", "9".to_string()));
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            EventKey::death(t, "A", "B").query_param(),
            ("since_time", "2024-05-01T12:00:00.000000Z".to_string())
        );
    }
}
