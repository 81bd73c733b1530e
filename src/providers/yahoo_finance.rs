use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::cache::{self, KeyValueCollection};
use crate::core::price::{PriceProvider, PriceResult};
use crate::providers::util::{USER_AGENT, endpoint, get_json, http_client};

const PRICE_MAX_AGE: Duration = Duration::from_secs(15 * 60);

// YahooFinanceProvider implementation for PriceProvider
pub struct YahooFinanceProvider {
    base_url: String,
    collection: Arc<dyn KeyValueCollection>,
    force_refresh: bool,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, collection: Arc<dyn KeyValueCollection>) -> Self {
        YahooFinanceProvider {
            base_url: base_url.to_string(),
            collection,
            force_refresh: false,
        }
    }

    pub fn with_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceResult> {
        let url = endpoint(
            &self.base_url,
            &format!("/v8/finance/chart/{symbol}"),
            &[
                ("interval", "1d".to_string()),
                ("range", "1d".to_string()),
            ],
        )?;
        let client = http_client(USER_AGENT)?;
        let data: YahooPriceResponse = get_json(&client, &url).await?;

        if let Some(error) = data.chart.error {
            return Err(anyhow!(
                "Yahoo Finance error for {}: {}",
                symbol,
                error.description.unwrap_or(error.code)
            ));
        }
        let item = data
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No price data found for symbol: {}", symbol))?;

        let price = item.meta.regular_market_price;
        let day_change = item
            .meta
            .previous_close
            .or(item.meta.chart_previous_close)
            .filter(|p| *p > 0.0)
            .map(|prev| (price - prev) / prev * 100.0);

        Ok(PriceResult {
            price,
            currency: item.meta.currency,
            short_name: item.meta.short_name.or(item.meta.long_name),
            day_change,
        })
    }
}

#[derive(Deserialize, Debug)]
struct YahooPriceResponse {
    chart: PriceChartResult,
}

#[derive(Deserialize, Debug)]
struct PriceChartResult {
    result: Option<Vec<PriceChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PriceChartItem {
    meta: PriceChartMeta,
}

#[derive(Deserialize, Debug)]
struct PriceChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    currency: String,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
    #[serde(alias = "longName")]
    long_name: Option<String>,
    #[serde(alias = "previousClose")]
    previous_close: Option<f64>,
    #[serde(alias = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooPriceFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_price(&self, symbol: &str) -> Result<PriceResult> {
        let key = format!("price:{}", symbol.to_uppercase());
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            &key,
            PRICE_MAX_AGE,
            self.force_refresh,
            || self.fetch_quote(symbol),
        )
        .await?;
        if cached.stale {
            debug!("Using stale quote for {} from {}", symbol, cached.fetched_at);
        }
        Ok(cached.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(symbol: &str, mock_response: &str) -> wiremock::MockServer {
        let mock_server = wiremock::MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn provider(server: &MockServer) -> YahooFinanceProvider {
        YahooFinanceProvider::new(&server.uri(), Arc::new(MemoryCollection::new()))
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_response = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 150.65,
                        "currency": "USD",
                        "shortName": "Apple Inc."
                    }
                }],
                "error": null
            }
        }"#;

        let mock_server = create_mock_server("AAPL", mock_response).await;
        let result = provider(&mock_server).fetch_price("AAPL").await.unwrap();
        assert_eq!(result.price, 150.65);
        assert_eq!(result.currency, "USD");
        assert_eq!(result.short_name.as_deref(), Some("Apple Inc."));
        assert!(result.day_change.is_none());
    }

    #[tokio::test]
    async fn test_day_change_from_previous_close() {
        let mock_response = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 66000.0,
                        "currency": "USD",
                        "chartPreviousClose": 60000.0
                    }
                }]
            }
        }"#;

        let mock_server = create_mock_server("BTC-USD", mock_response).await;
        let result = provider(&mock_server).fetch_price("BTC-USD").await.unwrap();
        assert!((result.day_change.unwrap() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_price_result_data() {
        let mock_response = r#"{"chart": {"result": []}}"#;
        let mock_server = create_mock_server("INVALID", mock_response).await;

        let result = provider(&mock_server).fetch_price("INVALID").await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("No price data found for symbol: INVALID")
        );
    }

    #[tokio::test]
    async fn test_yahoo_error_payload() {
        let mock_response = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let mock_server = create_mock_server("GONE", mock_response).await;

        let err = provider(&mock_server).fetch_price("GONE").await.unwrap_err();
        assert!(err.to_string().contains("symbol may be delisted"));
    }

    #[tokio::test]
    async fn test_quotes_are_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": [{"meta": {"regularMarketPrice": 400.0, "currency": "USD"}}]}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server);
        provider.fetch_price("MSFT").await.unwrap();
        let again = provider.fetch_price("msft").await.unwrap();
        assert_eq!(again.price, 400.0);
    }
}
