//! Economic calendar built from recurring release rules.
//!
//! Official agencies publish on fixed patterns (first Friday, the 15th moved
//! off weekends, every six weeks from a meeting date), so the calendar is
//! generated locally from rules rather than fetched.

use crate::core::cache::{self, KeyValueCollection};
use anyhow::{Result, bail};
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Impact::Low => "Low",
            Impact::Medium => "Medium",
            Impact::High => "High",
        })
    }
}

/// How a date that falls on a weekend or holiday is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    #[default]
    None,
    Following,
    Preceding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// The `nth` given weekday of the month; negative counts from the end
    /// (`-1` is the last one). An empty month list means every month.
    WeekdayOfMonth {
        weekday: Weekday,
        nth: i8,
        #[serde(default)]
        months: Vec<u32>,
    },
    /// A fixed day, clamped to the month's length.
    DayOfMonth {
        day: u32,
        #[serde(default)]
        adjust: Adjustment,
        #[serde(default)]
        months: Vec<u32>,
    },
    Weekly {
        weekday: Weekday,
    },
    IntervalWeeks {
        anchor: NaiveDate,
        weeks: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub id: String,
    pub name: String,
    pub country: String,
    pub authority: String,
    pub impact: Impact,
    pub rule: RecurrenceRule,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub events: Vec<EconomicEvent>,
    /// Leave out the built-in release catalogue.
    #[serde(default)]
    pub skip_builtin: bool,
}

impl CalendarConfig {
    pub fn events(&self) -> Vec<EconomicEvent> {
        let mut events = if self.skip_builtin {
            Vec::new()
        } else {
            builtin_events()
        };
        for event in &self.events {
            match events.iter_mut().find(|e| e.id == event.id) {
                Some(existing) => *existing = event.clone(),
                None => events.push(event.clone()),
            }
        }
        events
    }
}

pub fn is_business_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

pub fn adjust(date: NaiveDate, adjustment: Adjustment, holidays: &[NaiveDate]) -> NaiveDate {
    let step = |d: NaiveDate| match adjustment {
        Adjustment::Following => d.checked_add_days(Days::new(1)),
        Adjustment::Preceding => d.checked_sub_days(Days::new(1)),
        Adjustment::None => None,
    };
    let mut current = date;
    while !is_business_day(current, holidays) {
        match step(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: i8) -> Option<NaiveDate> {
    match nth {
        1..=5 => NaiveDate::from_weekday_of_month_opt(year, month, weekday, nth as u8),
        -5..=-1 => {
            let last = last_day_of_month(year, month)?;
            let back = (last.weekday().num_days_from_monday() + 7
                - weekday.num_days_from_monday())
                % 7;
            let last_match = last.checked_sub_days(Days::new(back as u64))?;
            let candidate =
                last_match.checked_sub_days(Days::new(7 * (nth.unsigned_abs() as u64 - 1)))?;
            (candidate.month() == month).then_some(candidate)
        }
        _ => None,
    }
}

/// Months from `from` to `to` inclusive, as (year, month).
fn months_between(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let start = from.year() * 12 + from.month0() as i32;
    let end = to.year() * 12 + to.month0() as i32;
    (start..=end).map(|m| (m.div_euclid(12), m.rem_euclid(12) as u32 + 1))
}

/// All dates produced by `rule` within `[from, to]`.
pub fn occurrences(
    rule: &RecurrenceRule,
    from: NaiveDate,
    to: NaiveDate,
    holidays: &[NaiveDate],
) -> Result<Vec<NaiveDate>> {
    if to < from {
        bail!("Calendar range ends ({to}) before it starts ({from})");
    }
    let in_months = |months: &[u32], month: u32| months.is_empty() || months.contains(&month);

    let mut dates: Vec<NaiveDate> = match rule {
        RecurrenceRule::WeekdayOfMonth {
            weekday,
            nth,
            months,
        } => {
            if *nth == 0 || !(-5..=5).contains(nth) {
                bail!("Weekday position must be 1..=5 or -5..=-1, got {nth}");
            }
            months_between(from, to)
                .filter(|(_, m)| in_months(months, *m))
                .filter_map(|(y, m)| nth_weekday(y, m, *weekday, *nth))
                .collect()
        }
        RecurrenceRule::DayOfMonth { day, adjust: how, months } => {
            if !(1..=31).contains(day) {
                bail!("Day of month must be within 1..=31, got {day}");
            }
            // Adjustment can carry a date across a month boundary into the range.
            let first = from.checked_sub_months(Months::new(1)).unwrap_or(from);
            let last = to.checked_add_months(Months::new(1)).unwrap_or(to);
            months_between(first, last)
                .filter(|(_, m)| in_months(months, *m))
                .filter_map(|(y, m)| {
                    let last = last_day_of_month(y, m)?;
                    let date = NaiveDate::from_ymd_opt(y, m, (*day).min(last.day()))?;
                    Some(adjust(date, *how, holidays))
                })
                .collect()
        }
        RecurrenceRule::Weekly { weekday } => {
            let offset = (weekday.num_days_from_monday() + 7
                - from.weekday().num_days_from_monday())
                % 7;
            let mut out = Vec::new();
            let mut date = from.checked_add_days(Days::new(offset as u64));
            while let Some(d) = date.filter(|d| *d <= to) {
                out.push(d);
                date = d.checked_add_days(Days::new(7));
            }
            out
        }
        RecurrenceRule::IntervalWeeks { anchor, weeks } => {
            if *weeks == 0 {
                bail!("Interval must be at least one week");
            }
            let period = 7 * *weeks as i64;
            let offset = (from - *anchor).num_days();
            let mut k = offset.div_euclid(period);
            if offset.rem_euclid(period) != 0 {
                k += 1;
            }
            let mut out = Vec::new();
            loop {
                let date = *anchor + chrono::Duration::days(k * period);
                if date > to {
                    break;
                }
                out.push(date);
                k += 1;
            }
            out
        }
    };

    dates.retain(|d| *d >= from && *d <= to);
    dates.sort();
    dates.dedup();
    Ok(dates)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent<'a> {
    pub date: NaiveDate,
    pub event: &'a EconomicEvent,
}

/// Every occurrence of `events` in `[from, to]`, by date then descending impact.
pub fn upcoming<'a>(
    events: &'a [EconomicEvent],
    from: NaiveDate,
    to: NaiveDate,
    holidays: &[NaiveDate],
) -> Result<Vec<ScheduledEvent<'a>>> {
    let mut schedule = Vec::new();
    for event in events {
        for date in occurrences(&event.rule, from, to, holidays)? {
            schedule.push(ScheduledEvent { date, event });
        }
    }
    schedule.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(b.event.impact.cmp(&a.event.impact))
            .then(a.event.name.cmp(&b.event.name))
    });
    debug!("Scheduled {} releases between {} and {}", schedule.len(), from, to);
    Ok(schedule)
}

/// Published figures for one release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseValues {
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
}

impl ReleaseValues {
    pub fn surprise(&self) -> Option<f64> {
        Some(self.actual? - self.forecast?)
    }

    /// Percent change of the actual figure against the prior period.
    pub fn change_pct(&self) -> Option<f64> {
        let previous = self.previous?;
        if previous == 0.0 {
            return None;
        }
        Some((self.actual? - previous) / previous.abs() * 100.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LatestRelease {
    date: NaiveDate,
    actual: f64,
}

fn release_key(event_id: &str, date: NaiveDate) -> String {
    format!("{event_id}:{date}")
}

fn latest_key(event_id: &str) -> String {
    format!("{event_id}:latest")
}

/// Stores release figures, merging with anything recorded earlier for the
/// same date. A missing `previous` is filled from the last recorded actual.
pub async fn record_release(
    collection: &dyn KeyValueCollection,
    event_id: &str,
    date: NaiveDate,
    values: ReleaseValues,
) -> Result<ReleaseValues> {
    let key = release_key(event_id, date);
    let stored: ReleaseValues = cache::read_json(collection, &key).await.unwrap_or_default();
    let mut merged = ReleaseValues {
        actual: values.actual.or(stored.actual),
        forecast: values.forecast.or(stored.forecast),
        previous: values.previous.or(stored.previous),
    };

    let latest: Option<LatestRelease> = cache::read_json(collection, &latest_key(event_id)).await;
    if merged.previous.is_none()
        && let Some(latest) = latest.filter(|l| l.date < date)
    {
        merged.previous = Some(latest.actual);
    }

    cache::write_json(collection, &key, &merged, None).await?;
    if let Some(actual) = merged.actual
        && latest.is_none_or(|l| l.date <= date)
    {
        cache::write_json(collection, &latest_key(event_id), &LatestRelease { date, actual }, None)
            .await?;
    }
    Ok(merged)
}

pub async fn release_values(
    collection: &dyn KeyValueCollection,
    event_id: &str,
    date: NaiveDate,
) -> Option<ReleaseValues> {
    cache::read_json(collection, &release_key(event_id, date)).await
}

fn event(
    id: &str,
    name: &str,
    country: &str,
    authority: &str,
    impact: Impact,
    time: &str,
    rule: RecurrenceRule,
) -> EconomicEvent {
    EconomicEvent {
        id: id.to_string(),
        name: name.to_string(),
        country: country.to_string(),
        authority: authority.to_string(),
        impact,
        rule,
        time: Some(time.to_string()),
    }
}

fn day_of_month(day: u32) -> RecurrenceRule {
    RecurrenceRule::DayOfMonth {
        day,
        adjust: Adjustment::Following,
        months: vec![],
    }
}

fn weekday_of_month(weekday: Weekday, nth: i8, months: &[u32]) -> RecurrenceRule {
    RecurrenceRule::WeekdayOfMonth {
        weekday,
        nth,
        months: months.to_vec(),
    }
}

/// Recurring releases compiled from the agencies' published schedules. Dates
/// follow each agency's usual pattern and can drift from the official
/// calendar around holidays.
pub fn builtin_events() -> Vec<EconomicEvent> {
    use Impact::*;
    use Weekday::*;

    let fomc = RecurrenceRule::IntervalWeeks {
        anchor: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default(),
        weeks: 6,
    };
    vec![
        event("us-cpi", "CPI", "US", "BLS", High, "08:30 ET", day_of_month(15)),
        event("us-ppi", "PPI", "US", "BLS", Medium, "08:30 ET", day_of_month(14)),
        event(
            "us-nfp",
            "Nonfarm Payrolls",
            "US",
            "BLS",
            High,
            "08:30 ET",
            weekday_of_month(Fri, 1, &[]),
        ),
        event(
            "us-jobless-claims",
            "Initial Jobless Claims",
            "US",
            "DOL",
            Medium,
            "08:30 ET",
            RecurrenceRule::Weekly { weekday: Thu },
        ),
        event("us-retail-sales", "Retail Sales", "US", "Census Bureau", Medium, "08:30 ET", day_of_month(16)),
        event("us-durable-goods", "Durable Goods Orders", "US", "Census Bureau", Medium, "08:30 ET", day_of_month(26)),
        event("us-housing-starts", "Housing Starts", "US", "Census Bureau", Low, "08:30 ET", day_of_month(18)),
        event("us-fomc", "FOMC Rate Decision", "US", "Federal Reserve", High, "14:00 ET", fomc.clone()),
        event("us-fed-press", "Fed Chair Press Conference", "US", "Federal Reserve", High, "14:30 ET", fomc),
        event(
            "us-gdp",
            "GDP Advance",
            "US",
            "BEA",
            High,
            "08:30 ET",
            weekday_of_month(Thu, -1, &[1, 4, 7, 10]),
        ),
        event("us-pce", "PCE Price Index", "US", "BEA", High, "08:30 ET", weekday_of_month(Fri, -1, &[])),
        event("us-personal-income", "Personal Income", "US", "BEA", Low, "08:30 ET", weekday_of_month(Fri, -1, &[])),
        event("us-ism-manufacturing", "ISM Manufacturing PMI", "US", "ISM", High, "10:00 ET", day_of_month(1)),
        event("us-ism-services", "ISM Services PMI", "US", "ISM", Medium, "10:00 ET", day_of_month(3)),
        event(
            "ecb-rate",
            "ECB Interest Rate Decision",
            "EU",
            "ECB",
            High,
            "14:15 CET",
            RecurrenceRule::IntervalWeeks {
                anchor: NaiveDate::from_ymd_opt(2024, 1, 25).unwrap_or_default(),
                weeks: 6,
            },
        ),
        event(
            "boe-rate",
            "BoE MPC Rate Decision",
            "UK",
            "Bank of England",
            High,
            "12:00 GMT",
            weekday_of_month(Thu, 1, &[2, 3, 5, 6, 8, 9, 11, 12]),
        ),
        event(
            "boj-rate",
            "BoJ Monetary Policy Decision",
            "JP",
            "Bank of Japan",
            High,
            "12:00 JST",
            weekday_of_month(Wed, -1, &[1, 3, 4, 6, 7, 9, 10, 12]),
        ),
    ]
}
