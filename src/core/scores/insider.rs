//! Insider confidence score from open-market insider trades.

use super::{Component, ScoreBand, Trend, clamp_score, ratio_to_score, total};
use crate::core::sector::Company;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const WINDOW_MONTHS: i32 = 24;
const CLUSTER_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsiderRole {
    Ceo,
    Cfo,
    Coo,
    Officer,
    Director,
    TenPercentOwner,
}

impl InsiderRole {
    /// Role from a Form 4 reporting-owner relationship. Named C-suite titles
    /// win over the officer flag; owners with only an "other" relationship
    /// count as directors.
    pub fn from_relationship(
        title: Option<&str>,
        officer: bool,
        director: bool,
        ten_percent_owner: bool,
    ) -> Self {
        let title = title.unwrap_or_default().to_lowercase();
        let has = |phrase: &str, acronym: &str| {
            title.contains(phrase)
                || title
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == acronym)
        };
        if has("chief executive", "ceo") {
            InsiderRole::Ceo
        } else if has("chief financial", "cfo") {
            InsiderRole::Cfo
        } else if has("chief operating", "coo") {
            InsiderRole::Coo
        } else if officer || !title.is_empty() {
            InsiderRole::Officer
        } else if director {
            InsiderRole::Director
        } else if ten_percent_owner {
            InsiderRole::TenPercentOwner
        } else {
            InsiderRole::Director
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            InsiderRole::Ceo | InsiderRole::Cfo | InsiderRole::Coo => 2.0,
            InsiderRole::Officer => 1.5,
            InsiderRole::Director => 1.0,
            InsiderRole::TenPercentOwner => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    #[serde(alias = "P", alias = "purchase")]
    Buy,
    #[serde(alias = "S", alias = "sale")]
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub date: NaiveDate,
    pub insider: String,
    pub role: InsiderRole,
    pub kind: TradeKind,
    pub shares: f64,
    pub price: f64,
}

impl InsiderTrade {
    fn value(&self) -> f64 {
        (self.shares * self.price).abs()
    }
}

/// Trades reported for one issuer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyTrades {
    pub company: Company,
    pub trades: Vec<InsiderTrade>,
}

#[async_trait]
pub trait InsiderTradeSource: Send + Sync {
    /// Open-market purchases and sales of `ticker` reported on or after `since`.
    async fn fetch_trades(&self, ticker: &str, since: NaiveDate) -> Result<CompanyTrades>;
}

/// First day of the scoring window that ends with the month of `as_of`.
pub fn window_start(as_of: NaiveDate) -> NaiveDate {
    as_of
        .with_day(1)
        .and_then(|d| d.checked_sub_months(Months::new(WINDOW_MONTHS as u32 - 1)))
        .unwrap_or(as_of)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthActivity {
    pub month: Option<NaiveDate>,
    pub buys: usize,
    pub sells: usize,
    pub buy_value: f64,
    pub sell_value: f64,
    pub distinct_buyers: usize,
    pub distinct_sellers: usize,
}

impl MonthActivity {
    fn direction(&self) -> i32 {
        if self.buys + self.sells == 0 {
            return 0;
        }
        match self.buy_value.partial_cmp(&self.sell_value) {
            Some(std::cmp::Ordering::Greater) => 1,
            Some(std::cmp::Ordering::Less) => -1,
            _ => 0,
        }
    }

    fn sentiment(&self) -> f64 {
        let gross = self.buy_value + self.sell_value;
        if gross > 0.0 {
            (self.buy_value - self.sell_value) / gross
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsiderScore {
    pub score: f64,
    pub band: ScoreBand,
    pub trend: Trend,
    pub components: Vec<Component>,
    pub months: Vec<MonthActivity>,
    pub trades: usize,
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn ratio(positive: f64, negative: f64) -> f64 {
    let gross = positive + negative;
    if gross > 0.0 {
        (positive - negative) / gross
    } else {
        0.0
    }
}

/// Scores the 24 months of trades ending with the month of `as_of`.
pub fn score(trades: &[InsiderTrade], as_of: NaiveDate) -> InsiderScore {
    let last = month_index(as_of);
    let first = last - WINDOW_MONTHS + 1;
    let window: Vec<&InsiderTrade> = trades
        .iter()
        .filter(|t| t.date <= as_of && month_index(t.date) >= first)
        .collect();

    let mut months: BTreeMap<i32, (MonthActivity, HashSet<&str>, HashSet<&str>)> =
        BTreeMap::new();
    let (mut buys, mut sells) = (0.0, 0.0);
    let (mut buy_value, mut sell_value) = (0.0, 0.0);
    let (mut buy_weight, mut sell_weight) = (0.0, 0.0);

    for trade in &window {
        let entry = months.entry(month_index(trade.date)).or_insert_with(|| {
            let month = NaiveDate::from_ymd_opt(trade.date.year(), trade.date.month(), 1);
            (
                MonthActivity {
                    month,
                    ..Default::default()
                },
                HashSet::new(),
                HashSet::new(),
            )
        });
        match trade.kind {
            TradeKind::Buy => {
                entry.0.buys += 1;
                entry.0.buy_value += trade.value();
                entry.1.insert(trade.insider.as_str());
                buys += 1.0;
                buy_value += trade.value();
                buy_weight += trade.role.weight();
            }
            TradeKind::Sell => {
                entry.0.sells += 1;
                entry.0.sell_value += trade.value();
                entry.2.insert(trade.insider.as_str());
                sells += 1.0;
                sell_value += trade.value();
                sell_weight += trade.role.weight();
            }
        }
    }

    let months: BTreeMap<i32, MonthActivity> = months
        .into_iter()
        .map(|(idx, (mut activity, buyers, sellers))| {
            activity.distinct_buyers = buyers.len();
            activity.distinct_sellers = sellers.len();
            (idx, activity)
        })
        .collect();

    let trend = trend(&months, last);

    if window.is_empty() {
        return InsiderScore {
            score: 50.0,
            band: ScoreBand::from_score(50.0),
            trend,
            components: vec![],
            months: vec![],
            trades: 0,
        };
    }

    let buy_clusters = months
        .values()
        .filter(|m| m.distinct_buyers >= CLUSTER_SIZE)
        .count() as f64;
    let sell_clusters = months
        .values()
        .filter(|m| m.distinct_sellers >= CLUSTER_SIZE)
        .count() as f64;

    let components = vec![
        Component::percent("Net purchase ratio", ratio_to_score(ratio(buys, sells)), 0.25),
        Component::percent(
            "Value-weighted sentiment",
            ratio_to_score(ratio(buy_value, sell_value)),
            0.30,
        ),
        Component::percent(
            "Role-weighted activity",
            ratio_to_score(ratio(buy_weight, sell_weight)),
            0.20,
        ),
        Component::percent(
            "Cluster signal",
            clamp_score(50.0 + 20.0 * buy_clusters - 20.0 * sell_clusters),
            0.15,
        ),
        Component::percent(
            "Consistency",
            clamp_score(50.0 + 10.0 * streak(&months) as f64),
            0.10,
        ),
    ];

    let score = total(&components);
    InsiderScore {
        score,
        band: ScoreBand::from_score(score),
        trend,
        components,
        months: months.into_values().rev().collect(),
        trades: window.len(),
    }
}

/// Signed run of same-direction months counting back from the latest active
/// one. Quiet months are skipped.
fn streak(months: &BTreeMap<i32, MonthActivity>) -> i32 {
    let mut run: i32 = 0;
    for activity in months.values().rev() {
        let direction = activity.direction();
        if direction == 0 {
            if activity.buys + activity.sells == 0 {
                continue;
            }
            break;
        }
        if run == 0 || run.signum() == direction {
            run += direction;
        } else {
            break;
        }
    }
    run
}

fn trend(months: &BTreeMap<i32, MonthActivity>, last: i32) -> Trend {
    let window_sentiment = |from: i32, to: i32| {
        let (buy, sell) = months
            .range(from..=to)
            .fold((0.0, 0.0), |(b, s), (_, m)| (b + m.buy_value, s + m.sell_value));
        ratio(buy, sell)
    };
    let recent = window_sentiment(last - 2, last);
    let prior = window_sentiment(last - 5, last - 3);
    let momentum = recent - prior;
    if momentum > 0.1 {
        Trend::Improving
    } else if momentum < -0.1 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
