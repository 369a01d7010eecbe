//! Reporting periods and the classifier that maps them onto half-open
//! `[start, end)` windows in a fixed civil timezone.
//!
//! Every calendar comparison happens on local dates: timestamps are
//! converted into the configured zone before their date is read, never
//! compared as raw UTC days.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::KillboardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Today,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    AllTime,
}

impl Period {
    pub const ALL: [Period; 7] = [
        Period::Today,
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Quarterly,
        Period::Yearly,
        Period::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::AllTime => "all-time",
        }
    }

    /// Human label used in report titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
            Self::AllTime => "All-Time",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = KillboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            "all-time" | "alltime" | "all_time" | "all" => Ok(Self::AllTime),
            other => Err(KillboardError::UnknownPeriod(other.to_string())),
        }
    }
}

/// Which instance of a period a window refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The period `now` falls in. Used by on-demand reports.
    Current,
    /// The most recently finished period. Used by scheduled reports.
    Completed,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Start of the all-time window.
pub fn epoch_sentinel() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// Resolve a local wall-clock time to a UTC instant. Ambiguous times (DST
/// fall-back) take the earlier mapping; times inside a DST gap move forward
/// to the first valid minute after the gap.
pub fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    for minutes in 1..=180 {
        if let Some(dt) = tz
            .from_local_datetime(&(naive + Duration::minutes(minutes)))
            .earliest()
        {
            return dt.with_timezone(&Utc);
        }
    }
    naive.and_utc()
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Stateless period classifier bound to one civil timezone.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    tz: Tz,
    /// Local hour at which the rolling "daily" slice ends.
    daily_hour: u32,
}

impl Classifier {
    pub fn new(tz: Tz, daily_hour: u32) -> Self {
        Self {
            tz,
            daily_hour: daily_hour.min(23),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        resolve_local(&self.tz, date.and_time(NaiveTime::MIN))
    }

    fn days(&self, start: NaiveDate, end: NaiveDate) -> Window {
        Window {
            start: self.local_midnight(start),
            end: self.local_midnight(end),
        }
    }

    /// The window a period covers relative to `now`.
    pub fn window(&self, period: Period, anchor: Anchor, now: DateTime<Utc>) -> Window {
        let today = self.local_date(now);
        match period {
            Period::Today => {
                let day = match anchor {
                    Anchor::Current => today,
                    Anchor::Completed => today.pred_opt().unwrap_or(today),
                };
                self.days(day, day + Duration::days(1))
            }
            Period::Daily => {
                let cutoff = NaiveTime::from_hms_opt(self.daily_hour, 0, 0).unwrap_or(NaiveTime::MIN);
                let at_cutoff = |date: NaiveDate| resolve_local(&self.tz, date.and_time(cutoff));
                // Slices run cutoff to cutoff and are named by the date they end on.
                let current = if now < at_cutoff(today) {
                    today
                } else {
                    today + Duration::days(1)
                };
                let end = match anchor {
                    Anchor::Current => current,
                    Anchor::Completed => current - Duration::days(1),
                };
                Window {
                    start: at_cutoff(end - Duration::days(1)),
                    end: at_cutoff(end),
                }
            }
            Period::Weekly => {
                let monday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                let start = match anchor {
                    Anchor::Current => monday,
                    Anchor::Completed => monday - Duration::days(7),
                };
                self.days(start, start + Duration::days(7))
            }
            Period::Monthly => {
                let first = first_of_month(today.year(), today.month());
                let start = match anchor {
                    Anchor::Current => first,
                    Anchor::Completed => sub_months(first, 1),
                };
                self.days(start, add_months(start, 1))
            }
            Period::Quarterly => {
                let first = first_of_month(today.year(), today.month0() / 3 * 3 + 1);
                let start = match anchor {
                    Anchor::Current => first,
                    Anchor::Completed => sub_months(first, 3),
                };
                self.days(start, add_months(start, 3))
            }
            Period::Yearly => {
                let year = match anchor {
                    Anchor::Current => today.year(),
                    Anchor::Completed => today.year() - 1,
                };
                self.days(first_of_month(year, 1), first_of_month(year + 1, 1))
            }
            Period::AllTime => Window {
                start: epoch_sentinel(),
                end: DateTime::<Utc>::MAX_UTC,
            },
        }
    }

    pub fn in_window(
        &self,
        ts: DateTime<Utc>,
        period: Period,
        anchor: Anchor,
        now: DateTime<Utc>,
    ) -> bool {
        match period {
            Period::AllTime => true,
            _ => self.window(period, anchor, now).contains(ts),
        }
    }

    pub fn window_start(&self, period: Period, anchor: Anchor, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window(period, anchor, now).start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eastern() -> Classifier {
        Classifier::new(chrono_tz::America::New_York, 21)
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn today_compares_local_dates_not_utc_dates() {
        let c = eastern();
        // Noon EDT on March 15th.
        let now = utc(2024, 3, 15, 16, 0);

        // 23:30 EDT on the 14th: same UTC date as `now`, different local date.
        assert!(!c.in_window(utc(2024, 3, 15, 3, 30), Period::Today, Anchor::Current, now));
        // 00:30 EDT on the 15th.
        assert!(c.in_window(utc(2024, 3, 15, 4, 30), Period::Today, Anchor::Current, now));
        // 23:30 EDT on the 15th is already the 16th in UTC.
        assert!(c.in_window(utc(2024, 3, 16, 3, 30), Period::Today, Anchor::Current, now));
    }

    #[test]
    fn completed_today_is_yesterday() {
        let c = eastern();
        let now = utc(2024, 3, 15, 16, 0);
        let w = c.window(Period::Today, Anchor::Completed, now);
        assert_eq!(w.start, utc(2024, 3, 14, 4, 0));
        assert_eq!(w.end, utc(2024, 3, 15, 4, 0));
    }

    #[test]
    fn daily_is_fixed_slice_ending_at_cutoff_hour() {
        let c = eastern();
        // 22:00 EDT on the 15th.
        let now = utc(2024, 3, 16, 2, 0);
        let completed = c.window(Period::Daily, Anchor::Completed, now);
        assert_eq!(completed.start, utc(2024, 3, 15, 1, 0));
        assert_eq!(completed.end, utc(2024, 3, 16, 1, 0));

        let current = c.window(Period::Daily, Anchor::Current, now);
        assert_eq!(current.start, completed.end);
        assert_eq!(current.end, utc(2024, 3, 17, 1, 0));
        assert!(current.contains(now));
    }

    #[test]
    fn completed_daily_before_cutoff_has_already_ended() {
        let c = eastern();
        // 09:00 EDT on the 13th, well before the 21:00 cutoff.
        let now = utc(2024, 5, 13, 13, 0);
        let completed = c.window(Period::Daily, Anchor::Completed, now);
        assert!(completed.end <= now);
        assert_eq!(completed.start, utc(2024, 5, 12, 1, 0));
        assert_eq!(completed.end, utc(2024, 5, 13, 1, 0));

        let current = c.window(Period::Daily, Anchor::Current, now);
        assert_eq!(current.start, completed.end);
        assert_eq!(current.end, utc(2024, 5, 14, 1, 0));
    }

    #[test]
    fn daily_at_exact_cutoff_starts_a_new_slice() {
        let c = eastern();
        let cutoff = utc(2024, 5, 14, 1, 0);
        assert_eq!(c.window(Period::Daily, Anchor::Current, cutoff).start, cutoff);
        assert_eq!(c.window(Period::Daily, Anchor::Completed, cutoff).end, cutoff);
    }

    #[test]
    fn daily_slice_across_fall_back_is_25_hours() {
        let c = eastern();
        // 22:00 EST on 2024-11-03; clocks fell back that morning.
        let now = utc(2024, 11, 4, 3, 0);
        let w = c.window(Period::Daily, Anchor::Completed, now);
        assert_eq!(w.start, utc(2024, 11, 3, 1, 0));
        assert_eq!(w.end, utc(2024, 11, 4, 2, 0));
        assert_eq!(w.end - w.start, Duration::hours(25));
    }

    #[test]
    fn weekly_is_monday_aligned() {
        let c = eastern();
        // Monday 2024-03-18 09:00 EDT.
        let now = utc(2024, 3, 18, 13, 0);

        let completed = c.window(Period::Weekly, Anchor::Completed, now);
        assert_eq!(completed.start, utc(2024, 3, 11, 4, 0));
        assert_eq!(completed.end, utc(2024, 3, 18, 4, 0));

        let current = c.window(Period::Weekly, Anchor::Current, now);
        assert_eq!(current.start, completed.end);
        assert_eq!(current.end, utc(2024, 3, 25, 4, 0));
    }

    #[test]
    fn weekly_spanning_dst_change_stays_on_local_midnight() {
        let c = eastern();
        // Wednesday 2024-03-13; DST began Sunday the 10th.
        let now = utc(2024, 3, 13, 16, 0);
        let w = c.window(Period::Weekly, Anchor::Completed, now);
        // Monday March 4th 00:00 EST, Monday March 11th 00:00 EDT.
        assert_eq!(w.start, utc(2024, 3, 4, 5, 0));
        assert_eq!(w.end, utc(2024, 3, 11, 4, 0));
    }

    #[test]
    fn consecutive_months_partition_time() {
        let c = eastern();
        let now = utc(2024, 4, 10, 12, 0);
        let march = c.window(Period::Monthly, Anchor::Completed, now);
        let april = c.window(Period::Monthly, Anchor::Current, now);

        assert_eq!(march.end, april.start);
        // The boundary instant belongs to the later month only.
        assert!(!march.contains(april.start));
        assert!(april.contains(april.start));

        let probes = [
            utc(2024, 3, 1, 5, 0),
            utc(2024, 3, 31, 23, 59),
            utc(2024, 4, 1, 3, 59),
            utc(2024, 4, 1, 4, 0),
            utc(2024, 4, 20, 0, 0),
        ];
        for ts in probes {
            let hits = [march.contains(ts), april.contains(ts)]
                .iter()
                .filter(|hit| **hit)
                .count();
            assert_eq!(hits, 1, "{ts} should be in exactly one month");
        }
    }

    #[test]
    fn completed_month_wraps_year() {
        let c = eastern();
        let now = utc(2024, 1, 1, 14, 0);
        let w = c.window(Period::Monthly, Anchor::Completed, now);
        assert_eq!(w.start, utc(2023, 12, 1, 5, 0));
        assert_eq!(w.end, utc(2024, 1, 1, 5, 0));
    }

    #[test]
    fn quarter_boundaries() {
        let c = eastern();
        let now = utc(2024, 5, 20, 12, 0);
        let current = c.window(Period::Quarterly, Anchor::Current, now);
        assert_eq!(current.start, utc(2024, 4, 1, 4, 0));
        assert_eq!(current.end, utc(2024, 7, 1, 4, 0));

        let completed = c.window(Period::Quarterly, Anchor::Completed, now);
        assert_eq!(completed.start, utc(2024, 1, 1, 5, 0));
        assert_eq!(completed.end, current.start);
    }

    #[test]
    fn year_boundaries() {
        let c = eastern();
        let now = utc(2024, 1, 1, 15, 0);
        let w = c.window(Period::Yearly, Anchor::Completed, now);
        assert_eq!(w.start, utc(2023, 1, 1, 5, 0));
        assert_eq!(w.end, utc(2024, 1, 1, 5, 0));
    }

    #[test]
    fn all_time_contains_everything() {
        let c = eastern();
        let now = utc(2024, 1, 1, 0, 0);
        assert!(c.in_window(utc(1999, 1, 1, 0, 0), Period::AllTime, Anchor::Current, now));
        assert!(c.in_window(utc(2030, 1, 1, 0, 0), Period::AllTime, Anchor::Completed, now));
        assert_eq!(c.window_start(Period::AllTime, Anchor::Current, now), epoch_sentinel());
    }

    #[test]
    fn dst_gap_moves_forward() {
        let tz = chrono_tz::America::New_York;
        let gap = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(resolve_local(&tz, gap), utc(2024, 3, 10, 7, 0));
    }

    #[test]
    fn ambiguous_time_takes_earlier_mapping() {
        let tz = chrono_tz::America::New_York;
        // 01:30 happens twice on 2024-11-03: first in EDT, then in EST.
        let repeated = NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        assert_eq!(resolve_local(&tz, repeated), utc(2024, 11, 3, 5, 30));
    }

    #[test]
    fn period_names_round_trip_through_parse() {
        for period in Period::ALL {
            assert_eq!(period.as_str().parse::<Period>().unwrap(), period);
        }
        assert_eq!("All_Time".parse::<Period>().unwrap(), Period::AllTime);
        assert!("fortnightly".parse::<Period>().is_err());
    }
}
