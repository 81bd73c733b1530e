//! Income tax estimation with progressive brackets.
use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// Largest net capital loss that may offset ordinary income in a year.
const CAPITAL_LOSS_LIMIT: f64 = 3_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    #[default]
    Single,
    MarriedJoint,
    MarriedSeparate,
    HeadOfHousehold,
}

impl Display for FilingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FilingStatus::Single => "Single",
            FilingStatus::MarriedJoint => "Married filing jointly",
            FilingStatus::MarriedSeparate => "Married filing separately",
            FilingStatus::HeadOfHousehold => "Head of household",
        })
    }
}

/// One step of a progressive schedule. `rate` is a fraction; `up_to` is the
/// upper bound of taxable income for this rate, `None` for the top bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxBracket {
    pub rate: f64,
    pub up_to: Option<f64>,
}

impl TaxBracket {
    pub const fn new(rate_pct: f64, up_to: Option<f64>) -> Self {
        Self {
            rate: rate_pct / 100.0,
            up_to,
        }
    }
}

/// Parses `"22%:100525"`, `"22%:100,525"` or `"37%"` (top bracket).
impl FromStr for TaxBracket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rate_part, limit_part) = match s.split_once(':') {
            Some((rate, limit)) => (rate.trim(), Some(limit.trim())),
            None => (s.trim(), None),
        };
        let rate_pct: f64 = rate_part
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid bracket rate in '{s}'"))?;
        if !(0.0..=100.0).contains(&rate_pct) {
            bail!("Bracket rate out of range in '{s}'");
        }
        let up_to = match limit_part {
            None | Some("") => None,
            Some(limit) => Some(
                limit
                    .replace(',', "")
                    .parse::<f64>()
                    .map_err(|_| anyhow!("Invalid bracket limit in '{s}'"))?,
            ),
        };
        Ok(Self::new(rate_pct, up_to))
    }
}

impl TryFrom<String> for TaxBracket {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TaxBracket> for String {
    fn from(bracket: TaxBracket) -> Self {
        let rate = bracket.rate * 100.0;
        match bracket.up_to {
            Some(limit) => format!("{rate}%:{limit}"),
            None => format!("{rate}%"),
        }
    }
}

/// Checks that limits strictly increase and only the last bracket is open.
pub fn validate_schedule(brackets: &[TaxBracket]) -> Result<()> {
    let Some((last, rest)) = brackets.split_last() else {
        bail!("Tax schedule has no brackets");
    };
    if last.up_to.is_some() {
        bail!("The last tax bracket must not have an upper limit");
    }
    let mut previous = 0.0;
    for bracket in rest {
        match bracket.up_to {
            Some(limit) if limit > previous => previous = limit,
            Some(limit) => bail!("Tax bracket limit {limit} is not above {previous}"),
            None => bail!("Only the last tax bracket may be open-ended"),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BracketAmount {
    pub rate: f64,
    pub lower: f64,
    pub upper: Option<f64>,
    pub taxable: f64,
    pub tax: f64,
}

/// Tax on the slice `[start, start + amount)` of income, bracket by bracket.
/// Ordinary income starts at zero; preferential income is stacked on top of it.
fn tax_on_slice(brackets: &[TaxBracket], start: f64, amount: f64) -> (f64, Vec<BracketAmount>) {
    let end = start + amount.max(0.0);
    let mut lower = 0.0;
    let mut total = 0.0;
    let mut parts = Vec::new();

    for bracket in brackets {
        let upper = bracket.up_to.unwrap_or(f64::INFINITY);
        let taxable = (end.min(upper) - start.max(lower)).max(0.0);
        if taxable > 0.0 {
            let tax = taxable * bracket.rate;
            total += tax;
            parts.push(BracketAmount {
                rate: bracket.rate,
                lower,
                upper: bracket.up_to,
                taxable,
                tax,
            });
        }
        if upper >= end {
            break;
        }
        lower = upper;
    }
    (total, parts)
}

fn marginal_rate(brackets: &[TaxBracket], income: f64) -> f64 {
    brackets
        .iter()
        .find(|b| b.up_to.is_none_or(|limit| income < limit))
        .map_or(0.0, |b| b.rate)
}

#[derive(Debug, Clone)]
pub struct TaxTable {
    pub year: i32,
    ordinary: HashMap<FilingStatus, Vec<TaxBracket>>,
    capital_gains: HashMap<FilingStatus, Vec<TaxBracket>>,
    standard_deduction: HashMap<FilingStatus, f64>,
}

impl TaxTable {
    /// 2024 US federal schedules (IRS Rev. Proc. 2023-34).
    pub fn us_federal_2024() -> Self {
        let ordinary = |limits: [f64; 6]| -> Vec<TaxBracket> {
            let rates = [10.0, 12.0, 22.0, 24.0, 32.0, 35.0];
            let mut brackets: Vec<TaxBracket> = rates
                .iter()
                .zip(limits)
                .map(|(rate, limit)| TaxBracket::new(*rate, Some(limit)))
                .collect();
            brackets.push(TaxBracket::new(37.0, None));
            brackets
        };
        let gains = |zero_to: f64, fifteen_to: f64| {
            vec![
                TaxBracket::new(0.0, Some(zero_to)),
                TaxBracket::new(15.0, Some(fifteen_to)),
                TaxBracket::new(20.0, None),
            ]
        };

        Self {
            year: 2024,
            ordinary: HashMap::from([
                (
                    FilingStatus::Single,
                    ordinary([11_600.0, 47_150.0, 100_525.0, 191_950.0, 243_725.0, 609_350.0]),
                ),
                (
                    FilingStatus::MarriedJoint,
                    ordinary([23_200.0, 94_300.0, 201_050.0, 383_900.0, 487_450.0, 731_200.0]),
                ),
                (
                    FilingStatus::MarriedSeparate,
                    ordinary([11_600.0, 47_150.0, 100_525.0, 191_950.0, 243_725.0, 365_600.0]),
                ),
                (
                    FilingStatus::HeadOfHousehold,
                    ordinary([16_550.0, 63_100.0, 100_500.0, 191_950.0, 243_700.0, 609_350.0]),
                ),
            ]),
            capital_gains: HashMap::from([
                (FilingStatus::Single, gains(47_025.0, 518_900.0)),
                (FilingStatus::MarriedJoint, gains(94_050.0, 583_750.0)),
                (FilingStatus::MarriedSeparate, gains(47_025.0, 291_850.0)),
                (FilingStatus::HeadOfHousehold, gains(63_000.0, 551_350.0)),
            ]),
            standard_deduction: HashMap::from([
                (FilingStatus::Single, 14_600.0),
                (FilingStatus::MarriedJoint, 29_200.0),
                (FilingStatus::MarriedSeparate, 14_600.0),
                (FilingStatus::HeadOfHousehold, 21_900.0),
            ]),
        }
    }

    /// Replaces the ordinary schedule for one filing status.
    pub fn with_ordinary(mut self, status: FilingStatus, brackets: Vec<TaxBracket>) -> Result<Self> {
        validate_schedule(&brackets)?;
        self.ordinary.insert(status, brackets);
        Ok(self)
    }

    pub fn with_standard_deduction(mut self, status: FilingStatus, amount: f64) -> Self {
        self.standard_deduction.insert(status, amount);
        self
    }

    pub fn ordinary(&self, status: FilingStatus) -> Result<&[TaxBracket]> {
        self.ordinary
            .get(&status)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("No {} brackets for {}", self.year, status))
    }

    pub fn capital_gains(&self, status: FilingStatus) -> Result<&[TaxBracket]> {
        self.capital_gains
            .get(&status)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("No {} capital gains brackets for {}", self.year, status))
    }

    pub fn standard_deduction(&self, status: FilingStatus) -> f64 {
        self.standard_deduction.get(&status).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxProfile {
    pub filing_status: FilingStatus,
    pub wages: f64,
    pub business_income: f64,
    pub short_term_gains: f64,
    pub long_term_gains: f64,
    pub itemized_deductions: f64,
    /// 401(k)/IRA style contributions taken out before tax.
    pub pre_tax_contributions: f64,
    /// Flat state income tax in percent.
    pub state_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxConfig {
    pub profile: TaxProfile,
    /// Custom ordinary brackets for the profile's filing status.
    #[serde(default)]
    pub brackets: Option<Vec<TaxBracket>>,
    #[serde(default)]
    pub standard_deduction: Option<f64>,
}

impl TaxConfig {
    /// The 2024 federal table with this config's overrides applied.
    pub fn table(&self) -> Result<TaxTable> {
        let status = self.profile.filing_status;
        let mut table = TaxTable::us_federal_2024();
        if let Some(brackets) = &self.brackets {
            table = table.with_ordinary(status, brackets.clone())?;
        }
        if let Some(amount) = self.standard_deduction {
            table = table.with_standard_deduction(status, amount);
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeductionKind {
    Standard,
    Itemized,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxEstimate {
    pub filing_status: FilingStatus,
    pub gross_income: f64,
    pub adjustments: f64,
    pub deduction: f64,
    pub deduction_kind: DeductionKind,
    pub ordinary_taxable: f64,
    pub capital_gains_taxable: f64,
    pub ordinary_tax: f64,
    pub capital_gains_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub effective_rate: f64,
    pub marginal_rate: f64,
    pub brackets: Vec<BracketAmount>,
}

pub fn estimate(profile: &TaxProfile, table: &TaxTable) -> Result<TaxEstimate> {
    for (name, value) in [
        ("wages", profile.wages),
        ("itemized_deductions", profile.itemized_deductions),
        ("pre_tax_contributions", profile.pre_tax_contributions),
        ("state_rate", profile.state_rate),
    ] {
        if value < 0.0 {
            bail!("{name} must not be negative");
        }
    }

    let status = profile.filing_status;
    let ordinary_brackets = table.ordinary(status)?;
    let gains_brackets = table.capital_gains(status)?;

    let loss_limit = if status == FilingStatus::MarriedSeparate {
        CAPITAL_LOSS_LIMIT / 2.0
    } else {
        CAPITAL_LOSS_LIMIT
    };
    let net_gains = profile.short_term_gains + profile.long_term_gains;
    // Net losses offset ordinary income up to the limit; gains keep their character.
    let (ordinary_gains, long_term_gains) = if net_gains < 0.0 {
        (net_gains.max(-loss_limit), 0.0)
    } else if profile.long_term_gains < 0.0 {
        (net_gains, 0.0)
    } else if profile.short_term_gains < 0.0 {
        (0.0, net_gains)
    } else {
        (profile.short_term_gains, profile.long_term_gains)
    };

    let gross_income =
        profile.wages + profile.business_income + profile.short_term_gains + profile.long_term_gains;
    let ordinary_income = (profile.wages + profile.business_income + ordinary_gains
        - profile.pre_tax_contributions)
        .max(0.0);

    let standard = table.standard_deduction(status);
    let (deduction, deduction_kind) = if profile.itemized_deductions > standard {
        (profile.itemized_deductions, DeductionKind::Itemized)
    } else {
        (standard, DeductionKind::Standard)
    };

    let ordinary_taxable = (ordinary_income - deduction).max(0.0);
    let unused_deduction = (deduction - ordinary_income).max(0.0);
    let capital_gains_taxable = (long_term_gains - unused_deduction).max(0.0);

    let (ordinary_tax, brackets) = tax_on_slice(ordinary_brackets, 0.0, ordinary_taxable);
    let (capital_gains_tax, _) =
        tax_on_slice(gains_brackets, ordinary_taxable, capital_gains_taxable);
    let state_tax = (ordinary_taxable + capital_gains_taxable) * profile.state_rate / 100.0;
    let total_tax = ordinary_tax + capital_gains_tax + state_tax;

    debug!(
        "Tax estimate for {}: ordinary {ordinary_tax:.2}, gains {capital_gains_tax:.2}, state {state_tax:.2}",
        status
    );

    Ok(TaxEstimate {
        filing_status: status,
        gross_income,
        adjustments: profile.pre_tax_contributions,
        deduction,
        deduction_kind,
        ordinary_taxable,
        capital_gains_taxable,
        ordinary_tax,
        capital_gains_tax,
        state_tax,
        total_tax,
        effective_rate: if gross_income > 0.0 {
            total_tax / gross_income * 100.0
        } else {
            0.0
        },
        marginal_rate: marginal_rate(ordinary_brackets, ordinary_taxable) * 100.0
            + profile.state_rate,
        brackets,
    })
}
