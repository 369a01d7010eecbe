use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::info;

use crate::error::KillboardError;
use crate::normalize::Normalizer;
use crate::period::Classifier;

/// Secrets and locations loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer credential for the killboard backend.
    pub api_key: String,
    /// Default Discord webhook for all channels.
    pub webhook_url: Option<String>,
    /// Path to the TOML settings file.
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            api_key: required_env("KILLBOARD_API_KEY"),
            webhook_url: env::var("DISCORD_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            config_path: env::var("KILLBOARD_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("killboard.toml")),
        }
    }

    pub fn log_redacted(&self) {
        info!(
            config_path = %self.config_path.display(),
            api_key = if self.api_key.is_empty() { "(empty)" } else { "(set)" },
            webhook = if self.webhook_url.is_some() { "(set)" } else { "(unset)" },
            "Loaded environment configuration"
        );
    }
}

/// Per-channel webhook override, e.g. `DISCORD_WEBHOOK_URL_KILLS`.
pub fn webhook_override(channel: &str) -> Option<String> {
    let key = format!(
        "DISCORD_WEBHOOK_URL_{}",
        channel.to_ascii_uppercase().replace(['-', ' '], "_")
    );
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

// ---------------------------------------------------------------------------
// TOML settings
// ---------------------------------------------------------------------------

/// TOML-backed settings loaded once at startup. Secrets stay in env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: SourceConfig,
    pub relay: RelayConfig,
    pub reports: ReportsConfig,
    pub leaderboards: LeaderboardConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub poll_interval_secs: u64,
    /// Victims whose handle starts with one of these are never relayed.
    pub excluded_subject_prefixes: Vec<String>,
    /// Failed parse attempts on one key before the cursor steps past it.
    pub malformed_retry_cap: u32,
    pub kills_channel: String,
    pub deaths_channel: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            excluded_subject_prefixes: vec!["PU_".to_string(), "NPC_".to_string()],
            malformed_retry_cap: 3,
            kills_channel: "kills".to_string(),
            deaths_channel: "deaths".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportsConfig {
    pub enabled: bool,
    /// IANA zone name all calendar logic runs in.
    pub timezone: String,
    /// Local hour the rolling daily slice ends at.
    pub daily_hour: u32,
    pub channel: String,
    /// Local `HH:MM` fire times per trigger.
    pub daily_at: String,
    pub weekly_at: String,
    pub monthly_at: String,
    pub quarterly_at: String,
    pub yearly_at: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "America/New_York".to_string(),
            daily_hour: 21,
            channel: "reports".to_string(),
            daily_at: "21:00".to_string(),
            weekly_at: "09:00".to_string(),
            monthly_at: "09:00".to_string(),
            quarterly_at: "09:00".to_string(),
            yearly_at: "09:00".to_string(),
        }
    }
}

impl ReportsConfig {
    pub fn timezone(&self) -> Result<Tz, KillboardError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| KillboardError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn classifier(&self) -> Result<Classifier, KillboardError> {
        Ok(Classifier::new(self.timezone()?, self.daily_hour))
    }
}

/// Parse a local `HH:MM` clock time.
pub fn parse_clock(raw: &str) -> Result<NaiveTime, KillboardError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| KillboardError::Config(format!("invalid clock time {raw:?}, expected HH:MM")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderboardConfig {
    pub top_n: usize,
    /// Top-N used by single-facet reports.
    pub single_facet_top_n: usize,
    /// Organization names never ranked (sentinels and our own aliases).
    pub excluded_organizations: Vec<String>,
    pub excluded_zones: Vec<String>,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            single_facet_top_n: 10,
            excluded_organizations: vec!["Unknown".to_string()],
            excluded_zones: vec!["Unknown".to_string(), "N/A".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizationConfig {
    pub weapons: HashMap<String, String>,
    pub zones: HashMap<String, String>,
}

impl NormalizationConfig {
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(&self.weapons, &self.zones)
    }
}

impl FileConfig {
    /// Reject settings that would only fail later inside a running task.
    pub fn validate(&self) -> Result<(), KillboardError> {
        if self.relay.poll_interval_secs == 0 {
            return Err(KillboardError::Config("relay.poll_interval_secs must be > 0".into()));
        }
        if self.source.timeout_secs == 0 {
            return Err(KillboardError::Config("source.timeout_secs must be > 0".into()));
        }
        if self.reports.daily_hour > 23 {
            return Err(KillboardError::Config(format!(
                "reports.daily_hour must be 0-23, got {}",
                self.reports.daily_hour
            )));
        }
        if self.relay.malformed_retry_cap == 0 {
            return Err(KillboardError::Config("relay.malformed_retry_cap must be > 0".into()));
        }
        self.reports.timezone()?;
        for raw in [
            &self.reports.daily_at,
            &self.reports.weekly_at,
            &self.reports.monthly_at,
            &self.reports.quarterly_at,
            &self.reports.yearly_at,
        ] {
            parse_clock(raw)?;
        }
        Ok(())
    }
}

/// Load, parse and validate a TOML settings file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate settings from TOML text.
pub fn parse_config(content: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(content).context("Failed to parse config as TOML")?;
    config.validate()?;
    Ok(config)
}
