//! Pricing abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Look-back windows for history views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum HistoricalPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    ThreeYears,
    FiveYears,
    TenYears,
}

impl Display for HistoricalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistoricalPeriod::OneMonth => "1M",
                HistoricalPeriod::ThreeMonths => "3M",
                HistoricalPeriod::SixMonths => "6M",
                HistoricalPeriod::OneYear => "1Y",
                HistoricalPeriod::ThreeYears => "3Y",
                HistoricalPeriod::FiveYears => "5Y",
                HistoricalPeriod::TenYears => "10Y",
            }
        )
    }
}

impl HistoricalPeriod {
    pub fn to_duration(&self) -> Duration {
        match self {
            HistoricalPeriod::OneMonth => Duration::days(30),
            HistoricalPeriod::ThreeMonths => Duration::days(91),
            HistoricalPeriod::SixMonths => Duration::days(182),
            HistoricalPeriod::OneYear => Duration::days(365),
            HistoricalPeriod::ThreeYears => Duration::days(365 * 3),
            HistoricalPeriod::FiveYears => Duration::days(365 * 5),
            HistoricalPeriod::TenYears => Duration::days(365 * 10),
        }
    }
}

impl FromStr for HistoricalPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "1M" => Ok(HistoricalPeriod::OneMonth),
            "3M" => Ok(HistoricalPeriod::ThreeMonths),
            "6M" => Ok(HistoricalPeriod::SixMonths),
            "1Y" => Ok(HistoricalPeriod::OneYear),
            "3Y" => Ok(HistoricalPeriod::ThreeYears),
            "5Y" => Ok(HistoricalPeriod::FiveYears),
            "10Y" => Ok(HistoricalPeriod::TenYears),
            _ => Err(anyhow::anyhow!("Invalid historical period: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceResult {
    pub price: f64,
    pub currency: String,
    pub short_name: Option<String>,
    /// Percent change against the previous close, when known.
    pub day_change: Option<f64>,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceResult>;
}
