use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use killboard_common::config::{parse_clock, ReportsConfig};
use killboard_common::period::resolve_local;
use killboard_common::{KillboardError, Period};

use crate::guard::InFlight;
use crate::reports::ReportService;

/// Calendar predicate gating a trigger on the local date it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarRule {
    Always,
    Weekday(Weekday),
    DayOfMonth(u32),
    /// Jan 1, Apr 1, Jul 1, Oct 1.
    QuarterStart,
    /// Jan 1.
    YearStart,
}

impl CalendarRule {
    pub fn holds(&self, date: NaiveDate) -> bool {
        match self {
            Self::Always => true,
            Self::Weekday(day) => date.weekday() == *day,
            Self::DayOfMonth(day) => date.day() == *day,
            Self::QuarterStart => date.day() == 1 && date.month0() % 3 == 0,
            Self::YearStart => date.ordinal() == 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    /// Local wall-clock time.
    pub at: NaiveTime,
    pub rule: CalendarRule,
    pub period: Period,
    pub channel: String,
}

impl Trigger {
    pub fn new(name: &str, at: NaiveTime, rule: CalendarRule, period: Period, channel: &str) -> Self {
        Self {
            name: name.to_string(),
            at,
            rule,
            period,
            channel: channel.to_string(),
        }
    }

    /// The daily, weekly, monthly, quarterly and yearly report triggers.
    pub fn standard_set(config: &ReportsConfig) -> Result<Vec<Trigger>, KillboardError> {
        let channel = config.channel.as_str();
        Ok(vec![
            Trigger::new("daily", parse_clock(&config.daily_at)?, CalendarRule::Always, Period::Daily, channel),
            Trigger::new(
                "weekly",
                parse_clock(&config.weekly_at)?,
                CalendarRule::Weekday(Weekday::Mon),
                Period::Weekly,
                channel,
            ),
            Trigger::new(
                "monthly",
                parse_clock(&config.monthly_at)?,
                CalendarRule::DayOfMonth(1),
                Period::Monthly,
                channel,
            ),
            Trigger::new(
                "quarterly",
                parse_clock(&config.quarterly_at)?,
                CalendarRule::QuarterStart,
                Period::Quarterly,
                channel,
            ),
            Trigger::new("yearly", parse_clock(&config.yearly_at)?, CalendarRule::YearStart, Period::Yearly, channel),
        ])
    }

    /// Next local occurrence of `at` strictly after `now`, with the local
    /// date it belongs to. Occurrences before `now` are never returned.
    pub fn next_occurrence(&self, tz: &Tz, now: DateTime<Utc>) -> (NaiveDate, DateTime<Utc>) {
        let mut date = now.with_timezone(tz).date_naive();
        loop {
            let candidate = resolve_local(tz, date.and_time(self.at));
            if candidate > now {
                return (date, candidate);
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => return (date, candidate),
            }
        }
    }

    pub fn next_fire(&self, tz: &Tz, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_occurrence(tz, now).1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Fired,
    /// Calendar predicate was false for the date.
    NotDue,
    AlreadyRunning,
    Failed,
    UnknownTrigger,
}

impl fmt::Display for FireOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fired => "fired",
            Self::NotDue => "not_due",
            Self::AlreadyRunning => "already_running",
            Self::Failed => "failed",
            Self::UnknownTrigger => "unknown_trigger",
        };
        f.write_str(s)
    }
}

struct Slot {
    trigger: Trigger,
    guard: InFlight,
}

/// Fires report triggers at local wall-clock times, one task per trigger.
pub struct Scheduler {
    slots: Vec<Slot>,
    tz: Tz,
    reports: Arc<ReportService>,
}

impl Scheduler {
    pub fn new(triggers: Vec<Trigger>, tz: Tz, reports: Arc<ReportService>) -> Self {
        Self {
            slots: triggers
                .into_iter()
                .map(|trigger| Slot {
                    trigger,
                    guard: InFlight::new(),
                })
                .collect(),
            tz,
            reports,
        }
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.slots.iter().map(|s| &s.trigger)
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.trigger.name == name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.slot(name).is_some_and(|s| s.guard.is_running())
    }

    /// Clock-driven firing for the local `date`: a no-op when the trigger's
    /// calendar rule does not hold.
    pub async fn fire_scheduled(&self, name: &str, date: NaiveDate, now: DateTime<Utc>) -> FireOutcome {
        match self.slot(name) {
            Some(slot) => self.fire_slot(slot, Some(date), now).await,
            None => FireOutcome::UnknownTrigger,
        }
    }

    /// Manual firing. Skips the calendar rule but still refuses to start
    /// while the same trigger is in flight.
    pub async fn fire_now(&self, name: &str, now: DateTime<Utc>) -> FireOutcome {
        match self.slot(name) {
            Some(slot) => self.fire_slot(slot, None, now).await,
            None => {
                warn!(trigger = name, "Manual fire for unknown trigger");
                FireOutcome::UnknownTrigger
            }
        }
    }

    async fn fire_slot(&self, slot: &Slot, date: Option<NaiveDate>, now: DateTime<Utc>) -> FireOutcome {
        let trigger = &slot.trigger;
        if let Some(date) = date {
            if !trigger.rule.holds(date) {
                debug!(trigger = %trigger.name, %date, "Calendar rule not met, skipping");
                return FireOutcome::NotDue;
            }
        }

        let Some(_token) = slot.guard.try_enter() else {
            warn!(trigger = %trigger.name, "Previous run still in flight, skipping");
            return FireOutcome::AlreadyRunning;
        };

        match self
            .reports
            .publish(&trigger.name, trigger.period, &trigger.channel, now)
            .await
        {
            Ok(_) => FireOutcome::Fired,
            Err(e) => {
                error!(trigger = %trigger.name, error = %e, "Report failed");
                FireOutcome::Failed
            }
        }
    }

    /// Spawn one task per trigger and wait for all of them to stop.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(triggers = self.slots.len(), timezone = %self.tz, "Scheduler running");
        let mut handles = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            let scheduler = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_trigger(index, shutdown).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Trigger task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    async fn run_trigger(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        let slot = &self.slots[index];
        let trigger = &slot.trigger;

        loop {
            let now = Utc::now();
            let (date, fire_at) = trigger.next_occurrence(&self.tz, now);
            debug!(trigger = %trigger.name, next = %fire_at, "Trigger armed");
            let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // Woke before the wall clock caught up; re-arm for the same slot.
            if Utc::now() < fire_at {
                continue;
            }

            let outcome = self.fire_slot(slot, Some(date), fire_at).await;
            if outcome != FireOutcome::NotDue {
                info!(trigger = %trigger.name, %outcome, "Trigger fired");
            }
        }
    }
}
