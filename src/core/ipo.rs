//! IPO pipeline assembled from registration filings.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingType {
    S1,
    S1A,
    F1,
    F1A,
    Prospectus424B4,
    Withdrawal,
}

impl FilingType {
    pub const ALL: [FilingType; 6] = [
        FilingType::S1,
        FilingType::S1A,
        FilingType::F1,
        FilingType::F1A,
        FilingType::Prospectus424B4,
        FilingType::Withdrawal,
    ];

    pub fn form(&self) -> &'static str {
        match self {
            FilingType::S1 => "S-1",
            FilingType::S1A => "S-1/A",
            FilingType::F1 => "F-1",
            FilingType::F1A => "F-1/A",
            FilingType::Prospectus424B4 => "424B4",
            FilingType::Withdrawal => "RW",
        }
    }

    fn is_amendment(&self) -> bool {
        matches!(self, FilingType::S1A | FilingType::F1A)
    }
}

impl Display for FilingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.form())
    }
}

impl FromStr for FilingType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        FilingType::ALL
            .into_iter()
            .find(|t| t.form() == normalized)
            .ok_or_else(|| anyhow!("Unsupported filing type: {}", s))
    }
}

/// Pipeline stage, ordered from least to most advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpoStatus {
    Filed,
    Expected,
    Priced,
    Withdrawn,
}

impl Display for IpoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IpoStatus::Filed => "Filed",
            IpoStatus::Expected => "Expected",
            IpoStatus::Priced => "Priced",
            IpoStatus::Withdrawn => "Withdrawn",
        })
    }
}

pub fn classify(form: FilingType, has_price_range: bool) -> IpoStatus {
    match form {
        FilingType::S1 | FilingType::F1 => IpoStatus::Filed,
        t if t.is_amendment() && has_price_range => IpoStatus::Expected,
        FilingType::Prospectus424B4 => IpoStatus::Priced,
        FilingType::Withdrawal => IpoStatus::Withdrawn,
        _ => IpoStatus::Filed,
    }
}

const SPAC_SIC: &str = "6770";
const FUND_SICS: [&str; 3] = ["6221", "6722", "6726"];
const SPAC_PHRASES: [&str; 3] = ["acquisition corp", "acquisition co", "blank check"];
const FUND_WORDS: [&str; 4] = ["etf", "etn", "fund", "trust"];

/// True for SPACs, funds, trusts and ETFs.
pub fn is_excluded_issuer(name: &str, sic: Option<&str>) -> bool {
    if let Some(sic) = sic
        && (sic == SPAC_SIC || FUND_SICS.contains(&sic))
    {
        return true;
    }
    let name = name.to_lowercase();
    SPAC_PHRASES.iter().any(|phrase| name.contains(phrase))
        || name
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| FUND_WORDS.contains(&word))
}

/// An issuer that already files periodic reports is listed.
pub fn is_already_public<S: AsRef<str>>(recent_forms: &[S]) -> bool {
    recent_forms
        .iter()
        .any(|f| matches!(f.as_ref(), "10-K" | "10-Q" | "20-F" | "40-F"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpoFiling {
    pub accession: String,
    pub cik: String,
    pub company: String,
    pub form: FilingType,
    pub filed: NaiveDate,
    pub ticker: Option<String>,
    pub exchange: Option<String>,
    pub sic: Option<String>,
    pub shares: Option<f64>,
    pub price_low: Option<f64>,
    pub price_high: Option<f64>,
    pub final_price: Option<f64>,
}

impl IpoFiling {
    pub fn status(&self) -> IpoStatus {
        classify(
            self.form,
            self.price_low.is_some() && self.price_high.is_some(),
        )
    }

    /// Final price when priced, otherwise the midpoint of the range.
    pub fn price(&self) -> Option<f64> {
        self.final_price.or(match (self.price_low, self.price_high) {
            (Some(low), Some(high)) => Some((low + high) / 2.0),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        })
    }

    pub fn deal_size(&self) -> Option<f64> {
        Some(self.shares? * self.price()?)
    }
}

/// Offering terms read from the prospectus, supplied separately from the
/// filing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealTerms {
    pub accession: String,
    pub shares: Option<f64>,
    pub price_low: Option<f64>,
    pub price_high: Option<f64>,
    pub final_price: Option<f64>,
}

#[async_trait]
pub trait IpoFilingSource: Send + Sync {
    /// Registration filings for new issuers filed within `[from, to]`.
    async fn fetch_filings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IpoFiling>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Filings keyed by accession number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpoBook {
    filings: BTreeMap<String, IpoFiling>,
}

impl IpoBook {
    pub fn len(&self) -> usize {
        self.filings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filings.is_empty()
    }

    pub fn upsert(&mut self, filing: IpoFiling) -> UpsertOutcome {
        match self.filings.get_mut(&filing.accession) {
            Some(existing) if *existing == filing => UpsertOutcome::Unchanged,
            Some(existing) => {
                // Enrichment may be missing on a later pass; keep what we knew.
                let merged = IpoFiling {
                    ticker: filing.ticker.or_else(|| existing.ticker.take()),
                    exchange: filing.exchange.or_else(|| existing.exchange.take()),
                    sic: filing.sic.or_else(|| existing.sic.take()),
                    shares: filing.shares.or(existing.shares),
                    price_low: filing.price_low.or(existing.price_low),
                    price_high: filing.price_high.or(existing.price_high),
                    final_price: filing.final_price.or(existing.final_price),
                    ..filing
                };
                *existing = merged;
                UpsertOutcome::Updated
            }
            None => {
                self.filings.insert(filing.accession.clone(), filing);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Fills offering terms on a known filing. Returns false for an unknown
    /// accession number.
    pub fn apply_terms(&mut self, terms: &DealTerms) -> bool {
        match self.filings.get_mut(&terms.accession) {
            Some(filing) => {
                filing.shares = terms.shares.or(filing.shares);
                filing.price_low = terms.price_low.or(filing.price_low);
                filing.price_high = terms.price_high.or(filing.price_high);
                filing.final_price = terms.final_price.or(filing.final_price);
                true
            }
            None => false,
        }
    }

    /// Upserts every filing, returning (inserted, updated).
    pub fn merge(&mut self, filings: impl IntoIterator<Item = IpoFiling>) -> (usize, usize) {
        let mut counts = (0, 0);
        for filing in filings {
            match self.upsert(filing) {
                UpsertOutcome::Inserted => counts.0 += 1,
                UpsertOutcome::Updated => counts.1 += 1,
                UpsertOutcome::Unchanged => {}
            }
        }
        debug!("IPO book merge: {} inserted, {} updated", counts.0, counts.1);
        counts
    }

    /// One row per company: its most advanced filing, newest first.
    pub fn calendar(&self, since: Option<NaiveDate>) -> Vec<&IpoFiling> {
        let mut by_company: HashMap<&str, &IpoFiling> = HashMap::new();
        for filing in self.filings.values() {
            if is_excluded_issuer(&filing.company, filing.sic.as_deref()) {
                continue;
            }
            by_company
                .entry(filing.cik.as_str())
                .and_modify(|current| {
                    if (filing.status(), filing.filed) > (current.status(), current.filed) {
                        *current = filing;
                    }
                })
                .or_insert(filing);
        }

        let mut rows: Vec<&IpoFiling> = by_company
            .into_values()
            .filter(|f| since.is_none_or(|since| f.filed >= since))
            .collect();
        rows.sort_by(|a, b| b.filed.cmp(&a.filed).then(a.company.cmp(&b.company)));
        rows
    }
}
