//! Currency conversion abstractions

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Exchange rates quoted against a single base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRateTable {
    pub base: String,
    pub rates: HashMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRateTable {
    pub fn new(base: &str, rates: HashMap<String, f64>) -> Self {
        Self {
            base: base.to_uppercase(),
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_uppercase(), rate))
                .collect(),
            fetched_at: Utc::now(),
        }
    }

    fn units_per_base(&self, code: &str) -> Result<f64> {
        if code == self.base {
            return Ok(1.0);
        }
        match self.rates.get(code) {
            Some(rate) if *rate > 0.0 => Ok(*rate),
            Some(rate) => Err(anyhow!("Invalid rate {rate} for currency {code}")),
            None => Err(anyhow!("Unknown currency: {code}")),
        }
    }

    /// Units of `to` bought by one unit of `from`.
    pub fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(1.0);
        }
        Ok(self.units_per_base(&to)? / self.units_per_base(&from)?)
    }
}

/// Converts `value` from one currency to another, skipping the provider when
/// both are the same.
pub async fn convert(
    provider: &(dyn CurrencyRateProvider + Send + Sync),
    value: f64,
    from: &str,
    to: &str,
) -> Result<f64> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(value);
    }
    let rate = provider
        .get_rate(from, to)
        .await
        .map_err(|e| anyhow!("Currency conversion failed from {from} to {to}: {e}"))?;
    let converted = value * rate;
    debug!("Converted {value} from {from} to {to} at rate {rate}: {converted}");
    Ok(converted)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fixed-rate provider used across the crate's tests.
    pub(crate) struct MockCurrencyProvider {
        rates: HashMap<String, f64>,
    }

    impl MockCurrencyProvider {
        pub(crate) fn new() -> Self {
            Self {
                rates: HashMap::new(),
            }
        }

        pub(crate) fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
            self.rates.insert(format!("{from}:{to}"), rate);
            self
        }
    }

    #[async_trait]
    impl CurrencyRateProvider for MockCurrencyProvider {
        async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
            self.rates
                .get(&format!("{from}:{to}"))
                .copied()
                .ok_or_else(|| anyhow!("Rate not found for {} to {}", from, to))
        }
    }

    fn table() -> ExchangeRateTable {
        ExchangeRateTable::new(
            "usd",
            HashMap::from([
                ("eur".to_string(), 0.9),
                ("GBP".to_string(), 0.8),
                ("XXX".to_string(), 0.0),
            ]),
        )
    }

    #[test]
    fn test_rate_from_base() {
        assert_eq!(table().rate("USD", "EUR").unwrap(), 0.9);
    }

    #[test]
    fn test_rate_to_base() {
        let rate = table().rate("EUR", "USD").unwrap();
        assert!((rate - 1.0 / 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_cross_rate_and_case() {
        let rate = table().rate("gbp", "eur").unwrap();
        assert!((rate - 0.9 / 0.8).abs() < 1e-12);
        assert_eq!(table().rate("JPY", "jpy").unwrap(), 1.0);
    }

    #[test]
    fn test_unknown_and_invalid_currency() {
        assert_eq!(
            table().rate("USD", "CHF").unwrap_err().to_string(),
            "Unknown currency: CHF"
        );
        assert!(table().rate("XXX", "USD").is_err());
    }

    #[tokio::test]
    async fn test_convert_same_currency_skips_provider() {
        let provider = MockCurrencyProvider::new();
        assert_eq!(convert(&provider, 10.0, "usd", "USD").await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_convert_reports_pair_on_error() {
        let provider = MockCurrencyProvider::new().with_rate("EUR", "USD", 1.1);
        let converted = convert(&provider, 100.0, "EUR", "USD").await.unwrap();
        assert!((converted - 110.0).abs() < 1e-9);

        let err = convert(&provider, 1.0, "GBP", "USD").await.unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Currency conversion failed from GBP to USD")
        );
    }
}
