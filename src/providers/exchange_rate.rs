use crate::core::cache::{self, KeyValueCollection};
use crate::core::currency::{CurrencyRateProvider, ExchangeRateTable};
use crate::providers::util::{USER_AGENT, endpoint, get_json, http_client};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

const TABLE_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    base_code: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// Converts through one table of rates quoted against `base`, fetched at
/// most once per process and kept in the store between runs.
pub struct ExchangeRateProvider {
    base_url: String,
    base: String,
    collection: Arc<dyn KeyValueCollection>,
    force_refresh: bool,
    table: OnceCell<ExchangeRateTable>,
}

impl ExchangeRateProvider {
    pub fn new(base_url: &str, base: &str, collection: Arc<dyn KeyValueCollection>) -> Self {
        ExchangeRateProvider {
            base_url: base_url.to_string(),
            base: base.to_uppercase(),
            collection,
            force_refresh: false,
            table: OnceCell::new(),
        }
    }

    pub fn with_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    async fn fetch_table(&self) -> Result<ExchangeRateTable> {
        let url = endpoint(&self.base_url, &format!("/v6/latest/{}", self.base), &[])?;
        let client = http_client(USER_AGENT)?;
        let response: LatestRatesResponse = get_json(&client, &url).await?;

        if response.result != "success" {
            return Err(anyhow!(
                "Exchange rate lookup for {} failed: {}",
                self.base,
                response.error_type.as_deref().unwrap_or("unknown error")
            ));
        }
        let base = response.base_code.unwrap_or_else(|| self.base.clone());
        debug!("Fetched {} exchange rates against {}", response.rates.len(), base);
        Ok(ExchangeRateTable::new(&base, response.rates))
    }

    #[instrument(name = "ExchangeRateTable", skip(self), fields(base = %self.base))]
    pub async fn table(&self) -> Result<&ExchangeRateTable> {
        self.table
            .get_or_try_init(|| async {
                let key = format!("table:{}", self.base);
                let cached = cache::load_or_refresh(
                    self.collection.as_ref(),
                    &key,
                    TABLE_MAX_AGE,
                    self.force_refresh,
                    || self.fetch_table(),
                )
                .await?;
                Ok::<_, anyhow::Error>(cached.value)
            })
            .await
    }
}

#[async_trait]
impl CurrencyRateProvider for ExchangeRateProvider {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        self.table().await?.rate(from, to)
    }
}
