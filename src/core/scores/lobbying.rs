//! Lobbying influence score from quarterly disclosure filings.

use super::{Component, ScoreBand, Trend, clamp_score, total};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const WINDOW_QUARTERS: i32 = 12;
const TREND_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quarter {
    pub year: i32,
    pub quarter: u8,
}

impl Quarter {
    pub fn of(date: NaiveDate) -> Self {
        Quarter {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    pub fn index(&self) -> i32 {
        self.year * 4 + self.quarter as i32 - 1
    }

    fn from_index(index: i32) -> Self {
        Quarter {
            year: index.div_euclid(4),
            quarter: (index.rem_euclid(4) + 1) as u8,
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyingFiling {
    pub id: String,
    pub quarter: Quarter,
    pub registrant: String,
    pub amount: f64,
    #[serde(default)]
    pub issue_codes: Vec<String>,
    #[serde(default)]
    pub government_entities: Vec<String>,
    #[serde(default)]
    pub lobbyists: Vec<String>,
}

#[async_trait]
pub trait LobbyingSource: Send + Sync {
    /// Quarterly reports naming `client` as the lobbying client, for filing
    /// years `from_year..=to_year`.
    async fn fetch_filings(
        &self,
        client: &str,
        from_year: i32,
        to_year: i32,
    ) -> Result<Vec<LobbyingFiling>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterSpend {
    pub quarter: Quarter,
    pub amount: f64,
    pub filings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrantSpend {
    pub registrant: String,
    pub amount: f64,
    pub filings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LobbyingScore {
    pub score: f64,
    pub band: ScoreBand,
    pub trend: Trend,
    /// Last four quarters against the four before, in percent.
    pub spend_change_pct: Option<f64>,
    pub total_spend: f64,
    pub components: Vec<Component>,
    pub timeline: Vec<QuarterSpend>,
    pub registrants: Vec<RegistrantSpend>,
}

fn saturating(count: usize, full_at: f64) -> f64 {
    (count as f64 / full_at).min(1.0) * 100.0
}

/// Scores the 12 quarters ending with the quarter of `as_of`.
pub fn score(filings: &[LobbyingFiling], as_of: NaiveDate) -> LobbyingScore {
    let last = Quarter::of(as_of).index();
    let first = last - WINDOW_QUARTERS + 1;
    let window: Vec<&LobbyingFiling> = filings
        .iter()
        .filter(|f| (first..=last).contains(&f.quarter.index()))
        .collect();

    let mut by_quarter: BTreeMap<i32, QuarterSpend> = BTreeMap::new();
    let mut by_registrant: HashMap<&str, RegistrantSpend> = HashMap::new();
    let mut issues = HashSet::new();
    let mut entities = HashSet::new();
    let mut lobbyists = HashSet::new();

    for filing in &window {
        let quarter = by_quarter
            .entry(filing.quarter.index())
            .or_insert_with(|| QuarterSpend {
                quarter: filing.quarter,
                amount: 0.0,
                filings: 0,
            });
        quarter.amount += filing.amount;
        quarter.filings += 1;

        let registrant = by_registrant
            .entry(filing.registrant.as_str())
            .or_insert_with(|| RegistrantSpend {
                registrant: filing.registrant.clone(),
                amount: 0.0,
                filings: 0,
            });
        registrant.amount += filing.amount;
        registrant.filings += 1;

        issues.extend(filing.issue_codes.iter().map(|c| c.to_uppercase()));
        entities.extend(filing.government_entities.iter().map(|e| e.to_lowercase()));
        lobbyists.extend(filing.lobbyists.iter().map(|l| l.to_lowercase()));
    }

    let total_spend: f64 = window.iter().map(|f| f.amount).sum();
    let spend_between = |from: i32, to: i32| -> f64 {
        by_quarter.range(from..=to).map(|(_, q)| q.amount).sum()
    };
    let recent = spend_between(last - 3, last);
    let prior = spend_between(last - 7, last - 4);
    let spend_change_pct = (prior > 0.0).then(|| (recent - prior) / prior * 100.0);

    let trend_score = match spend_change_pct {
        Some(change) => 50.0 + (change / 2.0).clamp(-50.0, 50.0),
        None if recent > 0.0 => 100.0,
        None => 50.0,
    };
    let trend = match spend_change_pct {
        Some(change) if change > TREND_THRESHOLD_PCT => Trend::Improving,
        Some(change) if change < -TREND_THRESHOLD_PCT => Trend::Declining,
        None if recent > 0.0 => Trend::Improving,
        _ => Trend::Stable,
    };

    let spend_magnitude = if total_spend > 0.0 {
        clamp_score((total_spend.log10() - 4.0) / 4.0 * 100.0)
    } else {
        0.0
    };

    let components = vec![
        Component::percent("Spend magnitude", spend_magnitude, 0.30),
        Component::percent("Issue breadth", saturating(issues.len(), 20.0), 0.15),
        Component::percent("Government reach", saturating(entities.len(), 25.0), 0.15),
        Component::percent("Lobbyist count", saturating(lobbyists.len(), 50.0), 0.10),
        Component::percent(
            "Consistency",
            by_quarter.values().filter(|q| q.amount > 0.0).count() as f64
                / WINDOW_QUARTERS as f64
                * 100.0,
            0.15,
        ),
        Component::percent("Spend trend", trend_score, 0.15),
    ];

    let timeline = (first..=last)
        .map(|idx| {
            by_quarter.remove(&idx).unwrap_or(QuarterSpend {
                quarter: Quarter::from_index(idx),
                amount: 0.0,
                filings: 0,
            })
        })
        .collect();

    let mut registrants: Vec<RegistrantSpend> = by_registrant.into_values().collect();
    registrants.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then(a.registrant.cmp(&b.registrant))
    });

    let score = if window.is_empty() { 0.0 } else { total(&components) };
    LobbyingScore {
        score,
        band: ScoreBand::from_score(score),
        trend,
        spend_change_pct,
        total_spend,
        components,
        timeline,
        registrants,
    }
}
