use crate::core::cache::{self, KeyValueCollection};
use crate::core::config::SecProviderConfig;
use crate::core::ipo::{FilingType, IpoFiling, IpoFilingSource, is_already_public, is_excluded_issuer};
use crate::core::sector::Company;
use crate::providers::util::{endpoint, get_json, http_client};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub(crate) const FILINGS_MAX_AGE: Duration = Duration::from_secs(6 * 60 * 60);
const TICKERS_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 10;
const CONCURRENT_PROFILES: usize = 8;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    total: Option<SearchTotal>,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchTotal {
    value: usize,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: FilingSource,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilingSource {
    pub adsh: String,
    pub form: String,
    pub file_date: NaiveDate,
    #[serde(default)]
    pub ciks: Vec<String>,
    #[serde(default)]
    pub display_names: Vec<String>,
    #[serde(default)]
    pub sics: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    // Blank on forms without a reporting period.
    pub period_ending: Option<String>,
}

/// One row of the submissions API `recent` filings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RecentFiling {
    pub accession: String,
    pub form: String,
    pub filed: NaiveDate,
    pub report_date: Option<NaiveDate>,
    /// EDGAR acceptance time, Eastern.
    pub accepted: Option<NaiveDateTime>,
    pub items: String,
    pub primary_document: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CompanyProfile {
    #[serde(default)]
    pub cik: String,
    pub name: String,
    pub tickers: Vec<String>,
    pub exchanges: Vec<String>,
    pub sic: Option<String>,
    #[serde(default)]
    pub recent: Vec<RecentFiling>,
}

impl CompanyProfile {
    pub fn forms(&self) -> Vec<String> {
        self.recent.iter().map(|f| f.form.clone()).collect()
    }

    pub fn company(&self) -> Company {
        Company {
            cik: self.cik.clone(),
            name: self.name.clone(),
            ticker: self.tickers.first().cloned(),
            exchange: self.exchanges.first().cloned(),
            sic: self.sic.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct SubmissionsResponse {
    name: String,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    exchanges: Vec<Option<String>>,
    sic: Option<String>,
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// Parallel arrays, one entry per filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RecentFilings {
    accession_number: Vec<String>,
    form: Vec<String>,
    filing_date: Vec<String>,
    report_date: Vec<String>,
    acceptance_date_time: Vec<String>,
    items: Vec<String>,
    primary_document: Vec<String>,
}

impl RecentFilings {
    fn into_filings(self) -> Vec<RecentFiling> {
        let text = |column: &[String], i: usize| column.get(i).cloned().unwrap_or_default();
        self.form
            .iter()
            .enumerate()
            .filter_map(|(i, form)| {
                let filed = self.filing_date.get(i)?.parse().ok()?;
                Some(RecentFiling {
                    accession: text(&self.accession_number, i),
                    form: form.clone(),
                    filed,
                    report_date: self.report_date.get(i).and_then(|d| d.parse().ok()),
                    accepted: self
                        .acceptance_date_time
                        .get(i)
                        .and_then(|t| parse_acceptance(t)),
                    items: text(&self.items, i),
                    primary_document: text(&self.primary_document, i),
                })
            })
            .collect()
    }
}

/// EDGAR stamps acceptance times with a `Z` suffix even though they are
/// Eastern wall-clock times; the offset is dropped.
fn parse_acceptance(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.get(..19)?;
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").ok()
}

/// Splits an EDGAR display name such as `"Acme Inc  (ACME)  (CIK 0001234567)"`
/// into the company name and ticker.
pub(crate) fn parse_display_name(display: &str) -> (String, Option<String>) {
    let mut parts = display.split("  (");
    let name = parts.next().unwrap_or_default().trim().to_string();
    let ticker = parts
        .map(|p| p.trim_end_matches(')').trim())
        .find(|p| !p.starts_with("CIK") && !p.is_empty())
        .map(|t| t.split(',').next().unwrap_or(t).trim().to_string());
    (name, ticker)
}

pub(crate) fn normalize_cik(cik: &str) -> String {
    cik.trim().parse::<u64>().map_or_else(|_| cik.trim().to_string(), |n| format!("{n:010}"))
}

/// SEC EDGAR client: full-text search for IPO registrations and earnings
/// reports, the submissions API for issuer profiles and the filing archive
/// for Form 4 documents.
pub struct SecEdgarProvider {
    config: SecProviderConfig,
    collection: Arc<dyn KeyValueCollection>,
    force_refresh: bool,
}

impl SecEdgarProvider {
    pub fn new(config: SecProviderConfig, collection: Arc<dyn KeyValueCollection>) -> Self {
        SecEdgarProvider {
            config,
            collection,
            force_refresh: false,
        }
    }

    pub fn with_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub(crate) fn config(&self) -> &SecProviderConfig {
        &self.config
    }

    pub(crate) fn collection(&self) -> &dyn KeyValueCollection {
        self.collection.as_ref()
    }

    pub(crate) fn force_refresh(&self) -> bool {
        self.force_refresh
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        http_client(&self.config.user_agent)
    }

    pub(crate) async fn search(
        &self,
        client: &reqwest::Client,
        forms: &str,
        phrase: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FilingSource>> {
        let mut sources = Vec::new();

        for page in 0..MAX_PAGES {
            let mut params = vec![
                ("forms", forms.to_string()),
                ("dateRange", "custom".to_string()),
                ("startdt", from.to_string()),
                ("enddt", to.to_string()),
                ("from", (page * PAGE_SIZE).to_string()),
            ];
            if let Some(phrase) = phrase {
                params.push(("q", format!("\"{phrase}\"")));
            }
            let url = endpoint(&self.config.search_url, "/LATEST/search-index", &params)?;
            let response: SearchResponse = get_json(client, &url).await?;
            let received = response.hits.hits.len();
            sources.extend(response.hits.hits.into_iter().map(|h| h.source));

            let total = response.hits.total.map_or(0, |t| t.value);
            if received < PAGE_SIZE || sources.len() >= total {
                break;
            }
        }
        debug!("EDGAR search returned {} documents", sources.len());
        Ok(sources)
    }

    async fn fetch_company(&self, client: &reqwest::Client, cik: &str) -> Result<CompanyProfile> {
        let url = endpoint(
            &self.config.submissions_url,
            &format!("/submissions/CIK{cik}.json"),
            &[],
        )?;
        let response: SubmissionsResponse = get_json(client, &url).await?;
        Ok(CompanyProfile {
            cik: cik.to_string(),
            name: response.name,
            tickers: response.tickers,
            exchanges: response.exchanges.into_iter().flatten().collect(),
            sic: response.sic.filter(|s| !s.is_empty()),
            recent: response.filings.recent.into_filings(),
        })
    }

    pub(crate) async fn company(&self, client: &reqwest::Client, cik: &str) -> Result<CompanyProfile> {
        let key = format!("company:{cik}");
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            &key,
            FILINGS_MAX_AGE,
            self.force_refresh,
            || self.fetch_company(client, cik),
        )
        .await?;
        Ok(cached.value)
    }

    async fn fetch_tickers(&self, client: &reqwest::Client) -> Result<BTreeMap<String, String>> {
        let url = endpoint(&self.config.archives_url, "/files/company_tickers.json", &[])?;
        let entries: HashMap<String, TickerEntry> = get_json(client, &url).await?;
        Ok(entries
            .into_values()
            .map(|e| (e.ticker.to_uppercase(), format!("{:010}", e.cik_str)))
            .collect())
    }

    /// Resolves a ticker to a ten-digit CIK. A numeric argument is taken as
    /// a CIK already.
    pub(crate) async fn resolve_cik(&self, client: &reqwest::Client, ticker: &str) -> Result<String> {
        let ticker = ticker.trim();
        if !ticker.is_empty() && ticker.chars().all(|c| c.is_ascii_digit()) {
            return Ok(normalize_cik(ticker));
        }
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            "tickers",
            TICKERS_MAX_AGE,
            self.force_refresh,
            || self.fetch_tickers(client),
        )
        .await
        .context("Failed to load the SEC ticker list")?;
        cached
            .value
            .get(&ticker.to_uppercase())
            .cloned()
            .ok_or_else(|| anyhow!("Unknown ticker: {}", ticker))
    }

    /// Profiles for each distinct CIK; failures are logged and skipped.
    pub(crate) async fn profiles<'a>(
        &self,
        client: &reqwest::Client,
        ciks: impl Iterator<Item = &'a str>,
    ) -> HashMap<String, CompanyProfile> {
        let mut ciks: Vec<&str> = ciks.collect();
        ciks.sort_unstable();
        ciks.dedup();
        let mut profiles = HashMap::new();
        for chunk in ciks.chunks(CONCURRENT_PROFILES) {
            let loaded = join_all(chunk.iter().map(|cik| async move {
                match self.company(client, cik).await {
                    Ok(profile) => Some((cik.to_string(), profile)),
                    Err(e) => {
                        warn!("Could not load EDGAR profile for CIK {}: {:#}", cik, e);
                        None
                    }
                }
            }))
            .await;
            profiles.extend(loaded.into_iter().flatten());
        }
        profiles
    }

    async fn search_and_enrich(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IpoFiling>> {
        let client = self.client()?;
        let forms = FilingType::ALL
            .iter()
            .map(|f| f.form())
            .collect::<Vec<_>>()
            .join(",");
        let sources = self.search(&client, &forms, None, from, to).await?;

        // One search hit per document; keep one per accession.
        let mut by_accession: BTreeMap<String, IpoFiling> = BTreeMap::new();
        for source in sources {
            let Ok(form) = source.form.parse::<FilingType>() else {
                continue;
            };
            let Some(cik) = source.ciks.first().map(|c| normalize_cik(c)) else {
                continue;
            };
            let (company, ticker) = source
                .display_names
                .first()
                .map(|d| parse_display_name(d))
                .unwrap_or_default();
            by_accession.entry(source.adsh.clone()).or_insert(IpoFiling {
                accession: source.adsh,
                cik,
                company,
                form,
                filed: source.file_date,
                ticker,
                exchange: None,
                sic: source.sics.into_iter().next(),
                shares: None,
                price_low: None,
                price_high: None,
                final_price: None,
            });
        }

        let profiles = self
            .profiles(&client, by_accession.values().map(|f| f.cik.as_str()))
            .await;

        let filings: Vec<IpoFiling> = by_accession
            .into_values()
            .filter_map(|mut filing| {
                if let Some(profile) = profiles.get(&filing.cik) {
                    if is_already_public(&profile.forms()) {
                        return None;
                    }
                    if filing.company.is_empty() {
                        filing.company = profile.name.clone();
                    }
                    filing.ticker = filing.ticker.or_else(|| profile.tickers.first().cloned());
                    filing.exchange = profile.exchanges.first().cloned();
                    filing.sic = profile.sic.clone().or(filing.sic);
                }
                (!is_excluded_issuer(&filing.company, filing.sic.as_deref())).then_some(filing)
            })
            .collect();
        debug!("{} IPO filings after filtering", filings.len());
        Ok(filings)
    }
}

#[async_trait]
impl IpoFilingSource for SecEdgarProvider {
    #[instrument(name = "EdgarIpoFetch", skip(self))]
    async fn fetch_filings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<IpoFiling>> {
        let key = format!("search:{from}:{to}");
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            &key,
            FILINGS_MAX_AGE,
            self.force_refresh,
            || self.search_and_enrich(from, to),
        )
        .await
        .context("Failed to load IPO filings from SEC EDGAR")?;
        Ok(cached.value)
    }
}
