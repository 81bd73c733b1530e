//! Reconstructs a net worth time series from dated purchases.
//!
//! Each holding contributes a piecewise-linear curve: its running invested
//! total at every purchase date, ending at today's market value. The portfolio
//! series is the sum of those curves sampled on a regular grid.

use crate::core::config::{Assets, Purchase};
use crate::core::currency::{self, CurrencyRateProvider};
use crate::core::networth::{AssetCategory, NetWorth};
use anyhow::{Result, anyhow};
use chrono::{Duration, NaiveDate};
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A dated amount already converted into the reporting currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Everything needed to draw one holding's curve.
#[derive(Debug, Clone)]
pub struct HoldingTimeline {
    pub name: String,
    pub contributions: Vec<Contribution>,
    pub current_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub start: ValuePoint,
    pub end: ValuePoint,
    pub change: f64,
    pub change_pct: Option<f64>,
    pub cagr_pct: Option<f64>,
}

/// Cumulative invested amount after each purchase date. Same-day events are
/// merged and the running total never drops below zero.
pub fn running_totals(contributions: &[Contribution]) -> Vec<ValuePoint> {
    let mut sorted = contributions.to_vec();
    sorted.sort_by_key(|c| c.date);

    let mut points: Vec<ValuePoint> = Vec::with_capacity(sorted.len());
    let mut total = 0.0_f64;
    for contribution in sorted {
        total = (total + contribution.amount).max(0.0);
        match points.last_mut() {
            Some(last) if last.date == contribution.date => last.value = total,
            _ => points.push(ValuePoint {
                date: contribution.date,
                value: total,
            }),
        }
    }
    points
}

/// Value at `date` on the polyline through `anchors` (sorted by date).
/// Zero before the first anchor and flat after the last one.
pub fn interpolate(anchors: &[ValuePoint], date: NaiveDate) -> f64 {
    let (Some(first), Some(last)) = (anchors.first(), anchors.last()) else {
        return 0.0;
    };
    if date < first.date {
        return 0.0;
    }
    if date >= last.date {
        return last.value;
    }

    let idx = anchors.partition_point(|p| p.date <= date);
    let before = anchors[idx - 1];
    let after = anchors[idx];
    let span = (after.date - before.date).num_days() as f64;
    if span <= 0.0 {
        return after.value;
    }
    let t = (date - before.date).num_days() as f64 / span;
    before.value + (after.value - before.value) * t
}

impl HoldingTimeline {
    /// Purchase anchors followed by today's value. A holding without purchases
    /// is treated as held at its current value for the whole window; purchases
    /// dated after `today` are ignored.
    pub fn anchors(&self, start: NaiveDate, today: NaiveDate) -> Vec<ValuePoint> {
        let mut anchors: Vec<ValuePoint> = running_totals(&self.contributions)
            .into_iter()
            .filter(|p| p.date < today)
            .collect();

        if self.contributions.is_empty() {
            let from = start.min(today);
            anchors.push(ValuePoint {
                date: from,
                value: self.current_value,
            });
        }
        if anchors.last().is_none_or(|p| p.date < today) {
            anchors.push(ValuePoint {
                date: today,
                value: self.current_value,
            });
        }
        anchors
    }
}

/// Samples the summed holding curves every `step_days` from `start`, always
/// including `end`.
pub fn reconstruct(
    timelines: &[HoldingTimeline],
    start: NaiveDate,
    end: NaiveDate,
    step_days: u32,
) -> Result<Vec<ValuePoint>> {
    if end < start {
        return Err(anyhow!("History end {end} is before start {start}"));
    }
    if step_days == 0 {
        return Err(anyhow!("History step must be at least one day"));
    }

    let anchors: Vec<Vec<ValuePoint>> = timelines.iter().map(|t| t.anchors(start, end)).collect();
    debug!(
        "Reconstructing {} holdings from {} to {} every {} days",
        timelines.len(),
        start,
        end,
        step_days
    );

    let value_at = |date: NaiveDate| -> f64 { anchors.iter().map(|a| interpolate(a, date)).sum() };

    let step = Duration::days(step_days as i64);
    let mut series = Vec::new();
    let mut date = start;
    while date < end {
        series.push(ValuePoint {
            date,
            value: value_at(date),
        });
        date += step;
    }
    series.push(ValuePoint {
        date: end,
        value: value_at(end),
    });
    Ok(series)
}

/// Builds one timeline per valued holding. Purchases are converted from the
/// holding's currency at today's rate; holdings that could not be valued are
/// left out.
pub async fn build_timelines(
    assets: &Assets,
    net_worth: &NetWorth,
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
) -> Vec<HoldingTimeline> {
    let target = net_worth.target_currency.as_str();
    let mut timelines = Vec::new();

    for category in &net_worth.categories {
        let purchases: Vec<Vec<Purchase>> = match category.category {
            AssetCategory::Crypto => assets.crypto.iter().map(|h| h.purchases.clone()).collect(),
            AssetCategory::Stocks => assets.stocks.iter().map(|h| h.purchases.clone()).collect(),
            AssetCategory::RealEstate => assets
                .real_estate
                .iter()
                .map(|p| p.purchases.clone())
                .collect(),
            AssetCategory::Cash => assets
                .cash
                .iter()
                .map(|a| {
                    a.opened
                        .map(|date| Purchase {
                            date,
                            amount: a.balance,
                            units: None,
                        })
                        .into_iter()
                        .collect()
                })
                .collect(),
            AssetCategory::Valuables => assets
                .valuables
                .iter()
                .map(|v| match (v.acquired, v.purchase_price) {
                    (Some(date), Some(amount)) => vec![Purchase {
                        date,
                        amount,
                        units: None,
                    }],
                    _ => vec![],
                })
                .collect(),
        };

        for (holding, purchases) in category.holdings.iter().zip(purchases) {
            let (Some(current_value), Some(currency)) =
                (holding.converted_value, holding.value_currency.as_deref())
            else {
                warn!("Leaving {} out of history: no current value", holding.identifier);
                continue;
            };

            let rate = match currency::convert(currency_provider, 1.0, currency, target).await {
                Ok(rate) => rate,
                Err(e) => {
                    warn!("Leaving {} out of history: {}", holding.identifier, e);
                    continue;
                }
            };
            timelines.push(HoldingTimeline {
                name: holding.identifier.clone(),
                contributions: purchases
                    .iter()
                    .map(|p| Contribution {
                        date: p.date,
                        amount: p.amount * rate,
                    })
                    .collect(),
                current_value,
            });
        }
    }
    timelines
}

/// Change over the series, plus the compound annual growth rate when the
/// series covers at least a year and starts above zero.
pub fn summarize(series: &[ValuePoint]) -> Result<Option<HistorySummary>> {
    let (Some(start), Some(end)) = (series.first(), series.last()) else {
        return Ok(None);
    };
    let change = end.value - start.value;
    let change_pct = (start.value > 0.0).then(|| change / start.value * 100.0);

    let years = (end.date - start.date).num_days() as f64 / 365.0;
    let cagr_pct = if years >= 1.0 && start.value > 0.0 && end.value > 0.0 {
        let begin_bal =
            Decimal::from_f64(start.value).ok_or_else(|| anyhow!("Invalid start value"))?;
        let end_bal = Decimal::from_f64(end.value).ok_or_else(|| anyhow!("Invalid end value"))?;
        let n_years = Decimal::from_f64(years).ok_or_else(|| anyhow!("Invalid duration"))?;
        let rate = cagr(begin_bal, end_bal, n_years);
        Some(
            (rate * Decimal::from(100))
                .to_f64()
                .ok_or_else(|| anyhow!("CAGR percentage conversion failed"))?,
        )
    } else {
        None
    };

    Ok(Some(HistorySummary {
        start: *start,
        end: *end,
        change,
        change_pct,
        cagr_pct,
    }))
}
