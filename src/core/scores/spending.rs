//! Government influence score from federal award data.

use super::{Component, ScoreBand, total};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardCategory {
    Contract,
    Grant,
    Idv,
    Loan,
    DirectPayment,
    Other,
}

impl AwardCategory {
    pub const SCORED: usize = 5;

    /// Maps a USAspending award type code.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "A" | "B" | "C" | "D" => AwardCategory::Contract,
            "02" | "03" | "04" | "05" => AwardCategory::Grant,
            "07" | "08" => AwardCategory::Loan,
            "06" | "10" => AwardCategory::DirectPayment,
            c if c.starts_with("IDV_") => AwardCategory::Idv,
            _ => AwardCategory::Other,
        }
    }

    pub fn codes(&self) -> &'static [&'static str] {
        match self {
            AwardCategory::Contract => &["A", "B", "C", "D"],
            AwardCategory::Grant => &["02", "03", "04", "05"],
            AwardCategory::Idv => &[
                "IDV_A", "IDV_B", "IDV_B_A", "IDV_B_B", "IDV_B_C", "IDV_C", "IDV_D", "IDV_E",
            ],
            AwardCategory::Loan => &["07", "08"],
            AwardCategory::DirectPayment => &["06", "10"],
            AwardCategory::Other => &["09", "11", "-1"],
        }
    }

    pub const ALL: [AwardCategory; 6] = [
        AwardCategory::Contract,
        AwardCategory::Grant,
        AwardCategory::Idv,
        AwardCategory::Loan,
        AwardCategory::DirectPayment,
        AwardCategory::Other,
    ];
}

impl Display for AwardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AwardCategory::Contract => "Contracts",
            AwardCategory::Grant => "Grants",
            AwardCategory::Idv => "IDVs",
            AwardCategory::Loan => "Loans",
            AwardCategory::DirectPayment => "Direct Payments",
            AwardCategory::Other => "Other",
        })
    }
}

/// US federal fiscal years start on October 1st.
pub fn fiscal_year(date: NaiveDate) -> i32 {
    if date.month() >= 10 {
        date.year() + 1
    } else {
        date.year()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub id: String,
    pub recipient: String,
    pub amount: f64,
    pub category: AwardCategory,
    pub agency: Option<String>,
    pub state: Option<String>,
    pub date: NaiveDate,
}

#[async_trait]
pub trait AwardSource: Send + Sync {
    /// Awards to `recipient` with a start date within `[from, to]`.
    async fn fetch_awards(
        &self,
        recipient: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Award>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown<K> {
    pub key: K,
    pub amount: f64,
    pub awards: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingScore {
    pub score: f64,
    pub band: ScoreBand,
    pub total: f64,
    pub growth_pct: Option<f64>,
    pub components: Vec<Component>,
    pub by_year: Vec<Breakdown<i32>>,
    pub by_agency: Vec<Breakdown<String>>,
    pub by_category: Vec<Breakdown<AwardCategory>>,
    pub by_state: Vec<Breakdown<String>>,
}

fn add<K: Clone + Eq + std::hash::Hash>(
    map: &mut HashMap<K, Breakdown<K>>,
    key: K,
    amount: f64,
) {
    let entry = map.entry(key.clone()).or_insert(Breakdown {
        key,
        amount: 0.0,
        awards: 0,
    });
    entry.amount += amount;
    entry.awards += 1;
}

fn ranked<K: Ord>(map: HashMap<K, Breakdown<K>>) -> Vec<Breakdown<K>> {
    let mut rows: Vec<Breakdown<K>> = map.into_values().collect();
    rows.sort_by(|a, b| b.amount.total_cmp(&a.amount).then(a.key.cmp(&b.key)));
    rows
}

pub fn score(awards: &[Award]) -> SpendingScore {
    let mut by_year: BTreeMap<i32, Breakdown<i32>> = BTreeMap::new();
    let mut by_agency = HashMap::new();
    let mut by_category = HashMap::new();
    let mut by_state = HashMap::new();

    for award in awards {
        let year = fiscal_year(award.date);
        let entry = by_year.entry(year).or_insert(Breakdown {
            key: year,
            amount: 0.0,
            awards: 0,
        });
        entry.amount += award.amount;
        entry.awards += 1;

        if let Some(agency) = award.agency.as_ref().filter(|a| !a.is_empty()) {
            add(&mut by_agency, agency.clone(), award.amount);
        }
        add(&mut by_category, award.category, award.amount);
        if let Some(state) = award.state.as_ref().filter(|s| !s.is_empty()) {
            add(&mut by_state, state.to_uppercase(), award.amount);
        }
    }

    let total_amount: f64 = awards.iter().map(|a| a.amount).sum();
    let scored_categories: HashSet<AwardCategory> = by_category
        .keys()
        .copied()
        .filter(|c| *c != AwardCategory::Other)
        .collect();

    // Latest fiscal year with awards against the one before it.
    let growth_pct = by_year.iter().next_back().and_then(|(year, latest)| {
        by_year
            .get(&(year - 1))
            .filter(|prior| prior.amount > 0.0)
            .map(|prior| (latest.amount - prior.amount) / prior.amount * 100.0)
    });

    let obligations = if total_amount > 0.0 {
        (total_amount.log10() - 5.0) / 5.0 * 40.0
    } else {
        0.0
    };
    let components = vec![
        Component::points("Total obligations", obligations, 40.0),
        Component::points(
            "Agency diversity",
            by_agency.len().min(10) as f64 * 2.0,
            20.0,
        ),
        Component::points(
            "Award type mix",
            scored_categories.len() as f64 / AwardCategory::SCORED as f64 * 15.0,
            15.0,
        ),
        Component::points(
            "Geographic spread",
            (by_state.len() as f64 / 25.0).min(1.0) * 15.0,
            15.0,
        ),
        Component::points(
            "Growth",
            growth_pct.map_or(5.0, |g| 5.0 + (g / 20.0).clamp(-5.0, 5.0)),
            10.0,
        ),
    ];

    let score = if awards.is_empty() { 0.0 } else { total(&components) };
    SpendingScore {
        score,
        band: ScoreBand::from_score(score),
        total: total_amount,
        growth_pct,
        components,
        by_year: by_year.into_values().rev().collect(),
        by_agency: ranked(by_agency),
        by_category: ranked(by_category),
        by_state: ranked(by_state),
    }
}
