//! Earnings reports and reported quarterly results from SEC EDGAR.

use crate::core::cache;
use crate::core::earnings_calendar::{EarningsReport, EarningsReportSource, ReportForm};
use crate::core::scores::earnings::{
    CompanyQuarters, EarningsHistorySource, ReportedFact, quarters_from_facts,
};
use crate::providers::sec_edgar::{
    FILINGS_MAX_AGE, FilingSource, SecEdgarProvider, normalize_cik, parse_display_name,
};
use crate::providers::util::{endpoint, get_json};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// Heading every Item 2.02 current report carries.
const RESULTS_PHRASE: &str = "Results of Operations and Financial Condition";

const EPS_CONCEPTS: [&str; 2] = ["EarningsPerShareDiluted", "EarningsPerShareBasic"];
const EPS_UNIT: &str = "USD/shares";
const REVENUE_CONCEPTS: [&str; 4] = [
    "Revenues",
    "RevenueFromContractWithCustomerExcludingAssessedTax",
    "SalesRevenueNet",
    "RevenuesNetOfInterestExpense",
];
const REVENUE_UNIT: &str = "USD";

#[derive(Debug, Default, Deserialize)]
struct CompanyFacts {
    #[serde(default)]
    facts: Taxonomies,
}

#[derive(Debug, Default, Deserialize)]
struct Taxonomies {
    #[serde(rename = "us-gaap", default)]
    us_gaap: HashMap<String, Concept>,
}

#[derive(Debug, Default, Deserialize)]
struct Concept {
    #[serde(default)]
    units: HashMap<String, Vec<FactRow>>,
}

#[derive(Debug, Deserialize)]
struct FactRow {
    start: Option<NaiveDate>,
    end: NaiveDate,
    val: f64,
    filed: NaiveDate,
}

impl CompanyFacts {
    /// Facts of the best-populated concept among `concepts`. Issuers move
    /// between revenue tags over the years; the one with the longest
    /// history wins.
    fn facts(&self, concepts: &[&str], unit: &str) -> Vec<ReportedFact> {
        concepts
            .iter()
            .filter_map(|name| self.facts.us_gaap.get(*name)?.units.get(unit))
            .max_by_key(|rows| rows.len())
            .map(|rows| {
                rows.iter()
                    .map(|row| ReportedFact {
                        start: row.start,
                        end: row.end,
                        value: row.val,
                        filed: row.filed,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn report_from_source(source: FilingSource) -> Option<EarningsReport> {
    let form = ReportForm::from_filing(&source.form, &source.items)?;
    let cik = normalize_cik(source.ciks.first()?);
    let (company, ticker) = source
        .display_names
        .first()
        .map(|d| parse_display_name(d))
        .unwrap_or_default();
    Some(EarningsReport {
        accession: source.adsh,
        cik,
        company,
        ticker,
        form,
        filed: source.file_date,
        accepted: None,
        period: source.period_ending.and_then(|p| p.parse().ok()),
        sic: source.sics.into_iter().next(),
    })
}

impl SecEdgarProvider {
    async fn search_reports(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EarningsReport>> {
        let client = self.client()?;
        let mut sources = self.search(&client, "8-K", Some(RESULTS_PHRASE), from, to).await?;
        sources.extend(self.search(&client, "10-Q,10-K", None, from, to).await?);

        let mut by_accession: BTreeMap<String, EarningsReport> = BTreeMap::new();
        for report in sources.into_iter().filter_map(report_from_source) {
            by_accession.entry(report.accession.clone()).or_insert(report);
        }

        let profiles = self
            .profiles(&client, by_accession.values().map(|r| r.cik.as_str()))
            .await;
        let reports: Vec<EarningsReport> = by_accession
            .into_values()
            .filter_map(|mut report| {
                if let Some(profile) = profiles.get(&report.cik) {
                    if report.company.is_empty() {
                        report.company = profile.name.clone();
                    }
                    report.ticker = report.ticker.or_else(|| profile.tickers.first().cloned());
                    report.sic = profile.sic.clone().or(report.sic);
                    let filing = profile.recent.iter().find(|f| f.accession == report.accession);
                    report.accepted = filing.and_then(|f| f.accepted);
                    report.period = report.period.or(filing.and_then(|f| f.report_date));
                }
                // Unlisted filers (debt-only issuers, trusts) have no ticker.
                report.ticker.is_some().then_some(report)
            })
            .collect();
        debug!("{} earnings reports between {} and {}", reports.len(), from, to);
        Ok(reports)
    }

    async fn fetch_facts(&self, cik: &str) -> Result<CompanyFacts> {
        let client = self.client()?;
        let url = endpoint(
            &self.config().submissions_url,
            &format!("/api/xbrl/companyfacts/CIK{cik}.json"),
            &[],
        )?;
        get_json(&client, &url).await
    }

    async fn load_quarters(&self, ticker: &str) -> Result<CompanyQuarters> {
        let client = self.client()?;
        let cik = self.resolve_cik(&client, ticker).await?;
        let profile = self
            .company(&client, &cik)
            .await
            .with_context(|| format!("Failed to load EDGAR profile for {ticker}"))?;
        let facts = self.fetch_facts(&cik).await?;
        let quarters = quarters_from_facts(
            &facts.facts(&EPS_CONCEPTS, EPS_UNIT),
            &facts.facts(&REVENUE_CONCEPTS, REVENUE_UNIT),
        );
        Ok(CompanyQuarters {
            company: profile.company(),
            quarters,
        })
    }
}

#[async_trait]
impl EarningsReportSource for SecEdgarProvider {
    #[instrument(name = "EdgarEarningsFetch", skip(self))]
    async fn fetch_reports(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EarningsReport>> {
        let key = format!("earnings:{from}:{to}");
        let cached = cache::load_or_refresh(
            self.collection(),
            &key,
            FILINGS_MAX_AGE,
            self.force_refresh(),
            || self.search_reports(from, to),
        )
        .await
        .context("Failed to load earnings reports from SEC EDGAR")?;
        Ok(cached.value)
    }
}

#[async_trait]
impl EarningsHistorySource for SecEdgarProvider {
    #[instrument(name = "EdgarQuartersFetch", skip(self))]
    async fn fetch_quarters(&self, ticker: &str) -> Result<CompanyQuarters> {
        let key = format!("quarters:{}", ticker.trim().to_uppercase());
        let cached = cache::load_or_refresh(
            self.collection(),
            &key,
            FILINGS_MAX_AGE,
            self.force_refresh(),
            || self.load_quarters(ticker),
        )
        .await
        .with_context(|| format!("Failed to load reported results for {ticker}"))?;
        Ok(cached.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SecProviderConfig;
    use crate::core::earnings_calendar::ReportTiming;
    use crate::store::memory::MemoryCollection;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> SecEdgarProvider {
        let config = SecProviderConfig {
            search_url: server.uri(),
            submissions_url: server.uri(),
            archives_url: server.uri(),
            user_agent: "omnifolio-test test@example.com".to_string(),
        };
        SecEdgarProvider::new(config, Arc::new(MemoryCollection::new()))
    }

    fn hit(adsh: &str, form: &str, items: &str, cik: &str, name: &str) -> String {
        format!(
            r#"{{"_source": {{"adsh": "{adsh}", "form": "{form}", "file_date": "2024-05-02", "items": [{items}], "ciks": ["{cik}"], "display_names": ["{name}  (CIK {cik})"], "sics": []}}}}"#
        )
    }

    fn hits(hits: &[String]) -> String {
        format!(
            r#"{{"hits": {{"total": {{"value": {}}}, "hits": [{}]}}}}"#,
            hits.len(),
            hits.join(",")
        )
    }

    #[tokio::test]
    async fn test_fetch_reports_enriches_timing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/LATEST/search-index"))
            .and(query_param("forms", "8-K"))
            .and(query_param("q", format!("\"{RESULTS_PHRASE}\"")))
            .respond_with(ResponseTemplate::new(200).set_body_string(hits(&[
                hit("0001-24-000001", "8-K", r#""2.02","9.01""#, "0000000011", "Soft Corp  (SOFT)"),
                hit("0001-24-000002", "8-K", r#""5.02""#, "0000000011", "Soft Corp  (SOFT)"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/LATEST/search-index"))
            .and(query_param("forms", "10-Q,10-K"))
            .respond_with(ResponseTemplate::new(200).set_body_string(hits(&[
                hit("0002-24-000001", "10-Q", "", "0000000022", "Bank Holding Co"),
                hit("0003-24-000001", "10-Q", "", "0000000033", "Private Notes Trust"),
            ])))
            .mount(&server)
            .await;
        for (cik, name, tickers, sic, accession, accepted) in [
            ("0000000011", "Soft Corp", r#"["SOFT"]"#, "7372", "0001-24-000001", "2024-05-02T16:05:10.000Z"),
            ("0000000022", "Bank Holding Co", r#"["BNK"]"#, "6022", "0002-24-000001", "2024-05-02T07:15:00.000Z"),
            ("0000000033", "Private Notes Trust", "[]", "6189", "0003-24-000001", "2024-05-02T11:00:00.000Z"),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/submissions/CIK{cik}.json")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    r#"{{"name": "{name}", "tickers": {tickers}, "exchanges": [], "sic": "{sic}",
                        "filings": {{"recent": {{"accessionNumber": ["{accession}"], "form": ["10-Q"],
                        "filingDate": ["2024-05-02"], "reportDate": ["2024-03-31"],
                        "acceptanceDateTime": ["{accepted}"]}}}}}}"#
                )))
                .mount(&server)
                .await;
        }

        let reports = provider(&server)
            .fetch_reports(
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        let soft = reports.iter().find(|r| r.cik == "0000000011").unwrap();
        assert_eq!(soft.form, ReportForm::EarningsRelease);
        assert_eq!(soft.ticker.as_deref(), Some("SOFT"));
        assert_eq!(soft.timing(), ReportTiming::AfterClose);
        let bank = reports.iter().find(|r| r.cik == "0000000022").unwrap();
        assert_eq!(bank.ticker.as_deref(), Some("BNK"));
        assert_eq!(bank.timing(), ReportTiming::BeforeOpen);
        assert_eq!(bank.period, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(bank.sic.as_deref(), Some("6022"));
    }

    #[tokio::test]
    async fn test_fetch_quarters_from_company_facts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/company_tickers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"0": {"cik_str": 44, "ticker": "GADG", "title": "Gadget Inc"}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/submissions/CIK0000000044.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name": "Gadget Inc", "tickers": ["GADG"], "exchanges": ["NYSE"], "sic": "3571", "filings": {"recent": {}}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/xbrl/companyfacts/CIK0000000044.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"cik": 44, "entityName": "Gadget Inc", "facts": {"us-gaap": {
                    "EarningsPerShareDiluted": {"units": {"USD/shares": [
                        {"start": "2023-01-01", "end": "2023-03-31", "val": 0.50, "filed": "2023-04-28", "form": "10-Q"},
                        {"start": "2023-04-01", "end": "2023-06-30", "val": 0.55, "filed": "2023-07-28", "form": "10-Q"},
                        {"start": "2023-07-01", "end": "2023-09-30", "val": 0.60, "filed": "2023-10-27", "form": "10-Q"},
                        {"start": "2023-01-01", "end": "2023-12-31", "val": 2.40, "filed": "2024-02-02", "form": "10-K"}
                    ]}},
                    "SalesRevenueNet": {"units": {"USD": [
                        {"start": "2023-01-01", "end": "2023-03-31", "val": 900, "filed": "2023-04-28"}
                    ]}},
                    "RevenueFromContractWithCustomerExcludingAssessedTax": {"units": {"USD": [
                        {"start": "2023-01-01", "end": "2023-03-31", "val": 1000, "filed": "2023-04-28"},
                        {"start": "2023-04-01", "end": "2023-06-30", "val": 1100, "filed": "2023-07-28"}
                    ]}}
                }}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let result = provider.fetch_quarters("gadg").await.unwrap();
        assert_eq!(result.company.name, "Gadget Inc");
        assert_eq!(result.company.exchange.as_deref(), Some("NYSE"));

        let periods: Vec<&str> = result.quarters.iter().map(|q| q.period.as_str()).collect();
        assert_eq!(periods, vec!["2023-Q4", "2023-Q3", "2023-Q2", "2023-Q1"]);
        let q4 = &result.quarters[0];
        assert!((q4.eps_actual.unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(q4.revenue_actual, None);
        assert_eq!(result.quarters[3].revenue_actual, Some(1000.0));

        // Cached per ticker.
        let again = provider.fetch_quarters("GADG").await.unwrap();
        assert_eq!(again, result);
    }
}
