//! Insider trades from SEC Form 4 ownership documents.

use crate::core::cache;
use crate::core::scores::insider::{
    CompanyTrades, InsiderRole, InsiderTrade, InsiderTradeSource, TradeKind,
};
use crate::providers::sec_edgar::{RecentFiling, SecEdgarProvider};
use crate::providers::util::{endpoint, get_text};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

// Filed documents never change.
const DOCUMENT_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);
const MAX_DOCUMENTS: usize = 150;
const CONCURRENT_DOWNLOADS: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OwnershipDocument {
    reporting_owner: Vec<ReportingOwner>,
    non_derivative_table: Option<NonDerivativeTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportingOwner {
    reporting_owner_id: ReportingOwnerId,
    reporting_owner_relationship: Relationship,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportingOwnerId {
    rpt_owner_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Relationship {
    is_director: Option<String>,
    is_officer: Option<String>,
    is_ten_percent_owner: Option<String>,
    officer_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NonDerivativeTable {
    non_derivative_transaction: Vec<Transaction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Transaction {
    transaction_date: Value,
    transaction_coding: Coding,
    transaction_amounts: Amounts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Coding {
    transaction_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Amounts {
    transaction_shares: Value,
    transaction_price_per_share: Value,
}

/// Form 4 wraps most fields in `<value>`; footnote-only fields have none.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Value {
    value: Option<String>,
}

impl Value {
    fn number(&self) -> Option<f64> {
        self.value.as_deref()?.trim().parse().ok()
    }

    fn date(&self) -> Option<NaiveDate> {
        self.value.as_deref()?.trim().get(..10)?.parse().ok()
    }
}

fn flag(raw: &Option<String>) -> bool {
    matches!(raw.as_deref().map(str::trim), Some("1" | "true" | "TRUE" | "True"))
}

/// Open-market purchases (code P) and sales (code S) from one Form 4. Grants,
/// exercises, gifts and tax withholding carry other codes and are skipped.
pub(crate) fn parse_form4(xml: &str) -> Result<Vec<InsiderTrade>> {
    let document: OwnershipDocument =
        quick_xml::de::from_str(xml).context("Invalid ownership document")?;

    let Some(owner) = document.reporting_owner.first() else {
        return Ok(Vec::new());
    };
    let relationship = &owner.reporting_owner_relationship;
    let role = InsiderRole::from_relationship(
        relationship.officer_title.as_deref().map(str::trim),
        flag(&relationship.is_officer),
        flag(&relationship.is_director),
        flag(&relationship.is_ten_percent_owner),
    );
    let insider = owner.reporting_owner_id.rpt_owner_name.trim().to_string();

    let transactions = document
        .non_derivative_table
        .map(|t| t.non_derivative_transaction)
        .unwrap_or_default();
    Ok(transactions
        .into_iter()
        .filter_map(|t| {
            let kind = match t.transaction_coding.transaction_code.trim() {
                "P" => TradeKind::Buy,
                "S" => TradeKind::Sell,
                _ => return None,
            };
            Some(InsiderTrade {
                date: t.transaction_date.date()?,
                insider: insider.clone(),
                role,
                kind,
                shares: t.transaction_amounts.transaction_shares.number()?,
                price: t
                    .transaction_amounts
                    .transaction_price_per_share
                    .number()
                    .unwrap_or_default(),
            })
        })
        .collect())
}

/// Raw XML location of a filing. `primaryDocument` points at the rendered
/// view (`xslF345X05/form4.xml`); the source sits beside it.
fn document_url(archives_url: &str, cik: &str, filing: &RecentFiling) -> Result<Url> {
    let cik = cik.trim_start_matches('0');
    let accession = filing.accession.replace('-', "");
    let document = filing
        .primary_document
        .rsplit('/')
        .next()
        .unwrap_or(&filing.primary_document);
    endpoint(
        archives_url,
        &format!("/Archives/edgar/data/{cik}/{accession}/{document}"),
        &[],
    )
}

impl SecEdgarProvider {
    async fn fetch_form4(
        &self,
        client: &reqwest::Client,
        cik: &str,
        filing: &RecentFiling,
    ) -> Result<Vec<InsiderTrade>> {
        let url = document_url(&self.config().archives_url, cik, filing)?;
        let xml = get_text(client, &url).await?;
        parse_form4(&xml).with_context(|| format!("Failed to read Form 4 {}", filing.accession))
    }

    async fn form4_trades(
        &self,
        client: &reqwest::Client,
        cik: &str,
        filing: &RecentFiling,
    ) -> Result<Vec<InsiderTrade>> {
        let key = format!("form4:{}", filing.accession);
        let cached = cache::load_or_refresh(self.collection(), &key, DOCUMENT_MAX_AGE, false, || {
            self.fetch_form4(client, cik, filing)
        })
        .await?;
        Ok(cached.value)
    }
}

#[async_trait]
impl InsiderTradeSource for SecEdgarProvider {
    #[instrument(name = "EdgarForm4Fetch", skip(self))]
    async fn fetch_trades(&self, ticker: &str, since: NaiveDate) -> Result<CompanyTrades> {
        let client = self.client()?;
        let cik = self.resolve_cik(&client, ticker).await?;
        let profile = self
            .company(&client, &cik)
            .await
            .with_context(|| format!("Failed to load EDGAR profile for {ticker}"))?;

        let filings: Vec<&RecentFiling> = profile
            .recent
            .iter()
            .filter(|f| f.form == "4" && f.filed >= since)
            .take(MAX_DOCUMENTS)
            .collect();
        debug!("{} Form 4 filings for CIK {} since {}", filings.len(), cik, since);

        let client = &client;
        let cik = cik.as_str();
        let mut trades = Vec::new();
        let mut failed = 0;
        for chunk in filings.chunks(CONCURRENT_DOWNLOADS) {
            let results = join_all(chunk.iter().map(|filing| async move {
                (filing, self.form4_trades(client, cik, filing).await)
            }))
            .await;
            for (filing, result) in results {
                match result {
                    Ok(found) => trades.extend(found),
                    Err(e) => {
                        failed += 1;
                        warn!("Skipping Form 4 {}: {:#}", filing.accession, e);
                    }
                }
            }
        }
        if failed > 0 && failed == filings.len() {
            bail!("None of the {failed} Form 4 filings for {ticker} could be loaded");
        }

        trades.retain(|t| t.date >= since);
        trades.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.insider.cmp(&b.insider)));
        Ok(CompanyTrades {
            company: profile.company(),
            trades,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SecProviderConfig;
    use crate::store::memory::MemoryCollection;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn form4(owner: &str, relationship: &str, transactions: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<ownershipDocument>
    <schemaVersion>X0508</schemaVersion>
    <documentType>4</documentType>
    <issuer>
        <issuerCik>0000000777</issuerCik>
        <issuerName>Widget Corp</issuerName>
        <issuerTradingSymbol>WIDG</issuerTradingSymbol>
    </issuer>
    <reportingOwner>
        <reportingOwnerId>
            <rptOwnerCik>0000000888</rptOwnerCik>
            <rptOwnerName>{owner}</rptOwnerName>
        </reportingOwnerId>
        <reportingOwnerRelationship>{relationship}</reportingOwnerRelationship>
    </reportingOwner>
    <nonDerivativeTable>{transactions}</nonDerivativeTable>
</ownershipDocument>"#
        )
    }

    fn transaction(date: &str, code: &str, shares: &str, price: &str) -> String {
        format!(
            r#"<nonDerivativeTransaction>
    <securityTitle><value>Common Stock</value></securityTitle>
    <transactionDate><value>{date}</value></transactionDate>
    <transactionCoding>
        <transactionFormType>4</transactionFormType>
        <transactionCode>{code}</transactionCode>
        <equitySwapInvolved>0</equitySwapInvolved>
    </transactionCoding>
    <transactionAmounts>
        <transactionShares><value>{shares}</value></transactionShares>
        <transactionPricePerShare>{price}</transactionPricePerShare>
        <transactionAcquiredDisposedCode><value>A</value></transactionAcquiredDisposedCode>
    </transactionAmounts>
</nonDerivativeTransaction>"#
        )
    }

    #[test]
    fn test_parse_form4_keeps_open_market_trades() {
        let xml = form4(
            "Doe Jane",
            "<isDirector>1</isDirector><isOfficer>1</isOfficer><officerTitle>President &amp; CEO</officerTitle>",
            &[
                transaction("2024-05-01", "P", "1000", "<value>12.50</value>"),
                transaction("2024-05-02-05:00", "S", "250", "<value>13</value>"),
                transaction("2024-05-03", "A", "5000", "<value>0</value>"),
                transaction("2024-05-04", "F", "800", "<footnoteId id=\"F1\"/>"),
            ]
            .join(""),
        );
        let trades = parse_form4(&xml).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].insider, "Doe Jane");
        assert_eq!(trades[0].role, InsiderRole::Ceo);
        assert_eq!(trades[0].kind, TradeKind::Buy);
        assert_eq!(trades[0].shares, 1000.0);
        assert_eq!(trades[0].price, 12.5);
        assert_eq!(trades[1].kind, TradeKind::Sell);
        assert_eq!(trades[1].date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_parse_form4_without_transactions() {
        let xml = r#"<ownershipDocument>
            <reportingOwner>
                <reportingOwnerId><rptOwnerName>Fund LP</rptOwnerName></reportingOwnerId>
                <reportingOwnerRelationship><isTenPercentOwner>true</isTenPercentOwner></reportingOwnerRelationship>
            </reportingOwner>
        </ownershipDocument>"#;
        assert!(parse_form4(xml).unwrap().is_empty());
        assert!(parse_form4("not xml <").is_err());
    }

    #[test]
    fn test_document_url_uses_raw_xml() {
        let filing = RecentFiling {
            accession: "0000950170-24-051234".to_string(),
            form: "4".to_string(),
            filed: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            report_date: None,
            accepted: None,
            items: String::new(),
            primary_document: "xslF345X05/wk-form4_1714.xml".to_string(),
        };
        let url = document_url("https://www.sec.gov", "0000000777", &filing).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.sec.gov/Archives/edgar/data/777/000095017024051234/wk-form4_1714.xml"
        );
    }

    #[tokio::test]
    async fn test_fetch_trades_from_edgar() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/company_tickers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"0": {"cik_str": 777, "ticker": "WIDG", "title": "Widget Corp"}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/submissions/CIK0000000777.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"cik": "777", "name": "Widget Corp", "tickers": ["WIDG"], "exchanges": ["Nasdaq"], "sic": "3674",
                    "filings": {"recent": {
                        "accessionNumber": ["0001-24-000003", "0001-24-000002", "0001-24-000001", "0001-21-000001"],
                        "form": ["4", "4", "10-Q", "4"],
                        "filingDate": ["2024-05-03", "2024-04-03", "2024-04-01", "2021-01-05"],
                        "primaryDocument": ["xslF345X05/a.xml", "xslF345X05/b.xml", "q1.htm", "xslF345X05/old.xml"]
                    }}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Archives/edgar/data/777/000124000003/a.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(form4(
                "Roe Rick",
                "<isDirector>1</isDirector>",
                &transaction("2024-05-01", "P", "2000", "<value>40</value>"),
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Archives/edgar/data/777/000124000002/b.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = SecProviderConfig {
            search_url: server.uri(),
            submissions_url: server.uri(),
            archives_url: server.uri(),
            user_agent: "omnifolio-test test@example.com".to_string(),
        };
        let provider = SecEdgarProvider::new(config, Arc::new(MemoryCollection::new()));
        let since = NaiveDate::from_ymd_opt(2022, 7, 1).unwrap();
        let result = provider.fetch_trades("widg", since).await.unwrap();

        assert_eq!(result.company.name, "Widget Corp");
        assert_eq!(result.company.ticker.as_deref(), Some("WIDG"));
        assert_eq!(result.company.sic.as_deref(), Some("3674"));
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].insider, "Roe Rick");
        assert_eq!(result.trades[0].role, InsiderRole::Director);

        // Parsed documents are cached by accession.
        let again = provider.fetch_trades("WIDG", since).await.unwrap();
        assert_eq!(again.trades, result.trades);
    }
}
