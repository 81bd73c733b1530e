use crate::core::cache::{self, KeyValueCollection};
use crate::core::scores::lobbying::{LobbyingFiling, LobbyingSource, Quarter};
use crate::providers::util::{USER_AGENT, endpoint, get_json, http_client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const FILINGS_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MAX_PAGES: usize = 25;

#[derive(Debug, Deserialize)]
struct FilingsPage {
    next: Option<String>,
    #[serde(default)]
    results: Vec<LdaFiling>,
}

#[derive(Debug, Deserialize)]
struct LdaFiling {
    filing_uuid: String,
    filing_year: i32,
    filing_period: Option<String>,
    income: Option<Value>,
    expenses: Option<Value>,
    dt_posted: Option<String>,
    registrant: LdaName,
    #[serde(default)]
    lobbying_activities: Vec<LdaActivity>,
}

#[derive(Debug, Deserialize)]
struct LdaName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LdaActivity {
    general_issue_code: Option<String>,
    #[serde(default)]
    government_entities: Vec<LdaName>,
    #[serde(default)]
    lobbyists: Vec<LdaLobbyistEntry>,
}

#[derive(Debug, Deserialize)]
struct LdaLobbyistEntry {
    lobbyist: LdaPerson,
}

#[derive(Debug, Deserialize)]
struct LdaPerson {
    first_name: Option<String>,
    last_name: Option<String>,
}

fn quarter_of_period(period: &str) -> Option<u8> {
    match period {
        "first_quarter" => Some(1),
        "second_quarter" | "mid_year" => Some(2),
        "third_quarter" => Some(3),
        "fourth_quarter" | "year_end" => Some(4),
        _ => None,
    }
}

/// Reported amounts arrive as decimal strings or numbers.
fn amount(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl LdaFiling {
    fn into_filing(self) -> Option<LobbyingFiling> {
        let quarter = quarter_of_period(self.filing_period.as_deref()?)?;
        let amount = amount(self.income.as_ref())
            .or_else(|| amount(self.expenses.as_ref()))
            .unwrap_or(0.0);

        let mut issue_codes = Vec::new();
        let mut government_entities = Vec::new();
        let mut lobbyists = Vec::new();
        for activity in self.lobbying_activities {
            issue_codes.extend(activity.general_issue_code);
            government_entities.extend(activity.government_entities.into_iter().map(|e| e.name));
            lobbyists.extend(activity.lobbyists.into_iter().map(|l| {
                let first = l.lobbyist.first_name.unwrap_or_default();
                let last = l.lobbyist.last_name.unwrap_or_default();
                format!("{first} {last}").trim().to_string()
            }));
        }

        Some(LobbyingFiling {
            id: self.filing_uuid,
            quarter: Quarter {
                year: self.filing_year,
                quarter,
            },
            registrant: self.registrant.name,
            amount,
            issue_codes,
            government_entities,
            lobbyists,
        })
    }
}

/// Lobbying disclosures from the Senate LDA REST API.
pub struct SenateLdaProvider {
    base_url: String,
    collection: Arc<dyn KeyValueCollection>,
    force_refresh: bool,
}

impl SenateLdaProvider {
    pub fn new(base_url: &str, collection: Arc<dyn KeyValueCollection>) -> Self {
        SenateLdaProvider {
            base_url: base_url.to_string(),
            collection,
            force_refresh: false,
        }
    }

    pub fn with_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    async fn fetch_year(
        &self,
        client: &reqwest::Client,
        client_name: &str,
        year: i32,
    ) -> Result<Vec<LdaFiling>> {
        let mut url: Url = endpoint(
            &self.base_url,
            "/api/v1/filings/",
            &[
                ("client_name", client_name.to_string()),
                ("filing_year", year.to_string()),
            ],
        )?;
        let mut filings = Vec::new();
        for _ in 0..MAX_PAGES {
            let page: FilingsPage = get_json(client, &url).await?;
            filings.extend(page.results);
            match page.next {
                Some(next) => {
                    url = Url::parse(&next).with_context(|| format!("Invalid next link: {next}"))?
                }
                None => return Ok(filings),
            }
        }
        warn!(
            "Stopped after {} pages of {} filings for {}",
            MAX_PAGES, year, client_name
        );
        Ok(filings)
    }

    async fn fetch_all(
        &self,
        client_name: &str,
        from_year: i32,
        to_year: i32,
    ) -> Result<Vec<LobbyingFiling>> {
        let client = http_client(USER_AGENT)?;
        let client = &client;
        let pages = try_join_all(
            (from_year..=to_year).map(|year| self.fetch_year(client, client_name, year)),
        )
        .await?;

        // Amendments restate a period; the latest posting wins.
        let mut latest: HashMap<(String, Quarter), (Option<String>, LobbyingFiling)> =
            HashMap::new();
        for raw in pages.into_iter().flatten() {
            let posted = raw.dt_posted.clone();
            let Some(filing) = raw.into_filing() else {
                continue;
            };
            let key = (filing.registrant.to_lowercase(), filing.quarter);
            let newer = latest
                .get(&key)
                .is_none_or(|(existing, _)| posted > *existing);
            if newer {
                latest.insert(key, (posted, filing));
            }
        }

        let mut filings: Vec<LobbyingFiling> = latest.into_values().map(|(_, f)| f).collect();
        filings.sort_by(|a, b| a.quarter.cmp(&b.quarter).then(a.registrant.cmp(&b.registrant)));
        debug!("{} lobbying filings for {}", filings.len(), client_name);
        Ok(filings)
    }
}

#[async_trait]
impl LobbyingSource for SenateLdaProvider {
    #[instrument(name = "LdaFilingsFetch", skip(self))]
    async fn fetch_filings(
        &self,
        client: &str,
        from_year: i32,
        to_year: i32,
    ) -> Result<Vec<LobbyingFiling>> {
        let key = format!(
            "lobbying:{}:{}-{}",
            client.trim().to_lowercase(),
            from_year,
            to_year
        );
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            &key,
            FILINGS_MAX_AGE,
            self.force_refresh,
            || self.fetch_all(client, from_year, to_year),
        )
        .await
        .with_context(|| format!("Failed to load lobbying filings for {client}"))?;
        Ok(cached.value)
    }
}
