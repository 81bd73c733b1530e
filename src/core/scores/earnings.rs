//! Earnings surprise score.

use super::{Component, ScoreBand, clamp_score, total};
use crate::core::sector::Company;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BEAT_RATE_QUARTERS: usize = 4;
const MAGNITUDE_QUARTERS: usize = 8;
pub const DISPLAY_QUARTERS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsQuarter {
    pub period: String,
    pub reported: NaiveDate,
    pub eps_actual: Option<f64>,
    pub eps_estimate: Option<f64>,
    pub revenue_actual: Option<f64>,
    pub revenue_estimate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Beat,
    Meet,
    Miss,
}

impl EarningsQuarter {
    pub fn eps_surprise_pct(&self) -> Option<f64> {
        let (actual, estimate) = (self.eps_actual?, self.eps_estimate?);
        (estimate != 0.0).then(|| (actual - estimate) / estimate.abs() * 100.0)
    }

    pub fn revenue_surprise_pct(&self) -> Option<f64> {
        let (actual, estimate) = (self.revenue_actual?, self.revenue_estimate?);
        (estimate > 0.0).then(|| (actual - estimate) / estimate * 100.0)
    }

    pub fn eps_outcome(&self) -> Option<Outcome> {
        let (actual, estimate) = (self.eps_actual?, self.eps_estimate?);
        Some(outcome(actual, estimate))
    }

    pub fn revenue_outcome(&self) -> Option<Outcome> {
        let (actual, estimate) = (self.revenue_actual?, self.revenue_estimate?);
        Some(outcome(actual, estimate))
    }
}

/// One reported XBRL value with its reporting span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedFact {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
    pub value: f64,
    pub filed: NaiveDate,
}

impl ReportedFact {
    fn span_days(&self) -> Option<i64> {
        self.start.map(|start| (self.end - start).num_days())
    }
}

/// Reported actuals for one issuer, most recent quarter first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyQuarters {
    pub company: Company,
    pub quarters: Vec<EarningsQuarter>,
}

#[async_trait]
pub trait EarningsHistorySource: Send + Sync {
    async fn fetch_quarters(&self, ticker: &str) -> Result<CompanyQuarters>;
}

/// Consensus figures for one period, keyed like [`period_label`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEstimate {
    pub period: String,
    pub eps_estimate: Option<f64>,
    pub revenue_estimate: Option<f64>,
}

/// Calendar quarter containing `end`, e.g. `2024-Q1`.
pub fn period_label(end: NaiveDate) -> String {
    format!("{}-Q{}", end.year(), end.month0() / 3 + 1)
}

const QUARTER_DAYS: std::ops::RangeInclusive<i64> = 80..=100;
const YEAR_DAYS: std::ops::RangeInclusive<i64> = 350..=380;

/// Facts spanning `days`, one per period end. Later filings restate earlier
/// periods as comparatives, so the first filing of each period wins.
fn first_reported(
    facts: &[ReportedFact],
    days: &std::ops::RangeInclusive<i64>,
) -> BTreeMap<NaiveDate, ReportedFact> {
    let mut periods: BTreeMap<NaiveDate, ReportedFact> = BTreeMap::new();
    for fact in facts {
        if !fact.span_days().is_some_and(|d| days.contains(&d)) {
            continue;
        }
        match periods.get(&fact.end) {
            Some(existing) if existing.filed <= fact.filed => {}
            _ => {
                periods.insert(fact.end, fact.clone());
            }
        }
    }
    periods
}

/// Quarterly values by period end. Fourth quarters are rarely tagged on
/// their own, so a fiscal year with three tagged quarters yields the fourth
/// as the annual figure less the other three.
pub fn quarterly_values(facts: &[ReportedFact]) -> BTreeMap<NaiveDate, ReportedFact> {
    let mut quarters = first_reported(facts, &QUARTER_DAYS);
    for (end, annual) in first_reported(facts, &YEAR_DAYS) {
        let Some(start) = annual.start else {
            continue;
        };
        if quarters.contains_key(&end) {
            continue;
        }
        let inside: Vec<&ReportedFact> = quarters
            .range(start..end)
            .map(|(_, q)| q)
            .filter(|q| q.start.is_some_and(|s| s >= start))
            .collect();
        if inside.len() != 3 {
            continue;
        }
        let q4_start = inside.iter().map(|q| q.end).max().and_then(|d| d.succ_opt());
        let value = annual.value - inside.iter().map(|q| q.value).sum::<f64>();
        quarters.insert(
            end,
            ReportedFact {
                start: q4_start,
                end,
                value,
                filed: annual.filed,
            },
        );
    }
    quarters
}

/// Builds quarters from reported EPS and revenue facts, most recent first.
/// Estimates are left empty.
pub fn quarters_from_facts(eps: &[ReportedFact], revenue: &[ReportedFact]) -> Vec<EarningsQuarter> {
    let eps = quarterly_values(eps);
    let revenue = quarterly_values(revenue);
    let mut ends: Vec<&NaiveDate> = eps.keys().chain(revenue.keys()).collect();
    ends.sort_unstable();
    ends.dedup();

    ends.into_iter()
        .rev()
        .filter_map(|end| {
            let eps = eps.get(end);
            let revenue = revenue.get(end);
            let reported = eps.or(revenue)?.filed;
            Some(EarningsQuarter {
                period: period_label(*end),
                reported,
                eps_actual: eps.map(|f| f.value),
                eps_estimate: None,
                revenue_actual: revenue.map(|f| f.value),
                revenue_estimate: None,
            })
        })
        .collect()
}

/// Fills estimates into matching periods. Returns how many periods matched.
pub fn apply_estimates(quarters: &mut [EarningsQuarter], estimates: &[EarningsEstimate]) -> usize {
    let mut matched = 0;
    for quarter in quarters.iter_mut() {
        if let Some(estimate) = estimates
            .iter()
            .find(|e| e.period.eq_ignore_ascii_case(&quarter.period))
        {
            quarter.eps_estimate = estimate.eps_estimate.or(quarter.eps_estimate);
            quarter.revenue_estimate = estimate.revenue_estimate.or(quarter.revenue_estimate);
            matched += 1;
        }
    }
    matched
}

fn outcome(actual: f64, estimate: f64) -> Outcome {
    if actual > estimate {
        Outcome::Beat
    } else if actual < estimate {
        Outcome::Miss
    } else {
        Outcome::Meet
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsScore {
    pub score: f64,
    pub band: ScoreBand,
    /// Positive for consecutive beats, negative for consecutive misses.
    pub streak: i32,
    pub beat_rate: Option<f64>,
    pub revenue_beat_rate: Option<f64>,
    pub average_surprise: Option<f64>,
    pub magnitude: Option<f64>,
    pub components: Vec<Component>,
    /// Most recent first.
    pub quarters: Vec<EarningsQuarter>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn beat_rate(outcomes: impl Iterator<Item = Outcome>) -> Option<f64> {
    mean(outcomes.map(|o| if o == Outcome::Beat { 100.0 } else { 0.0 }))
}

pub fn score(quarters: &[EarningsQuarter]) -> EarningsScore {
    let mut quarters: Vec<EarningsQuarter> = quarters.to_vec();
    quarters.sort_by(|a, b| b.reported.cmp(&a.reported));

    let mut streak = 0i32;
    for outcome in quarters.iter().filter_map(EarningsQuarter::eps_outcome) {
        let step = match outcome {
            Outcome::Beat => 1,
            Outcome::Miss => -1,
            Outcome::Meet => break,
        };
        if streak == 0 || streak.signum() == step {
            streak += step;
        } else {
            break;
        }
    }

    let beat = beat_rate(
        quarters
            .iter()
            .filter_map(EarningsQuarter::eps_outcome)
            .take(BEAT_RATE_QUARTERS),
    );
    let revenue_beat = beat_rate(
        quarters
            .iter()
            .filter_map(EarningsQuarter::revenue_outcome)
            .take(BEAT_RATE_QUARTERS),
    );
    let average_surprise = mean(
        quarters
            .iter()
            .filter_map(EarningsQuarter::eps_surprise_pct)
            .take(BEAT_RATE_QUARTERS),
    );
    let magnitude = mean(
        quarters
            .iter()
            .filter_map(EarningsQuarter::eps_surprise_pct)
            .take(MAGNITUDE_QUARTERS)
            .map(f64::abs),
    );

    let components = vec![
        Component::percent("EPS beat rate", beat.unwrap_or(50.0), 0.4),
        Component::percent("Surprise streak", 50.0 + 12.5 * streak as f64, 0.2),
        Component::percent("Revenue beat rate", revenue_beat.unwrap_or(50.0), 0.2),
        Component::percent(
            "Average surprise",
            clamp_score(50.0 + average_surprise.unwrap_or(0.0) * 2.5),
            0.2,
        ),
    ];

    let score = total(&components);
    quarters.truncate(DISPLAY_QUARTERS);
    EarningsScore {
        score,
        band: ScoreBand::from_score(score),
        streak,
        beat_rate: beat,
        revenue_beat_rate: revenue_beat,
        average_surprise,
        magnitude,
        components,
        quarters,
    }
}
