use crate::core::cache::{self, KeyValueCollection};
use crate::core::scores::spending::{Award, AwardCategory, AwardSource};
use crate::providers::util::{USER_AGENT, endpoint, http_client, post_json};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const AWARDS_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 5;

#[derive(Debug, Serialize)]
struct AwardSearchRequest<'a> {
    filters: AwardFilters<'a>,
    fields: Vec<&'a str>,
    page: usize,
    limit: usize,
    sort: &'a str,
    order: &'a str,
}

#[derive(Debug, Serialize)]
struct AwardFilters<'a> {
    recipient_search_text: Vec<&'a str>,
    award_type_codes: &'a [&'a str],
    time_period: Vec<TimePeriod>,
}

#[derive(Debug, Serialize)]
struct TimePeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct AwardSearchResponse {
    #[serde(default)]
    results: Vec<AwardRow>,
    page_metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    #[serde(rename = "hasNext", default)]
    has_next: bool,
}

#[derive(Debug, Deserialize)]
struct AwardRow {
    #[serde(rename = "Award ID")]
    award_id: Option<String>,
    generated_internal_id: Option<String>,
    #[serde(rename = "Recipient Name")]
    recipient: Option<String>,
    #[serde(rename = "Award Amount")]
    award_amount: Option<f64>,
    #[serde(rename = "Loan Value")]
    loan_value: Option<f64>,
    #[serde(rename = "Awarding Agency")]
    agency: Option<String>,
    #[serde(rename = "Start Date")]
    start_date: Option<NaiveDate>,
    #[serde(rename = "Place of Performance State Code")]
    state: Option<String>,
}

impl AwardRow {
    fn into_award(self, category: AwardCategory, recipient: &str) -> Option<Award> {
        Some(Award {
            id: self.award_id.or(self.generated_internal_id)?,
            recipient: self.recipient.unwrap_or_else(|| recipient.to_string()),
            amount: self.award_amount.or(self.loan_value).unwrap_or(0.0),
            category,
            agency: self.agency,
            state: self.state,
            date: self.start_date?,
        })
    }
}

/// Federal awards from the USAspending.gov search API, one query per award
/// type group.
pub struct UsaSpendingProvider {
    base_url: String,
    collection: Arc<dyn KeyValueCollection>,
    force_refresh: bool,
}

impl UsaSpendingProvider {
    pub fn new(base_url: &str, collection: Arc<dyn KeyValueCollection>) -> Self {
        UsaSpendingProvider {
            base_url: base_url.to_string(),
            collection,
            force_refresh: false,
        }
    }

    pub fn with_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    async fn fetch_category(
        &self,
        client: &reqwest::Client,
        category: AwardCategory,
        recipient: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Award>> {
        let url = endpoint(&self.base_url, "/api/v2/search/spending_by_award/", &[])?;
        let amount_field = match category {
            AwardCategory::Loan => "Loan Value",
            _ => "Award Amount",
        };
        let mut awards = Vec::new();

        for page in 1..=MAX_PAGES {
            let request = AwardSearchRequest {
                filters: AwardFilters {
                    recipient_search_text: vec![recipient],
                    award_type_codes: category.codes(),
                    time_period: vec![TimePeriod {
                        start_date: from,
                        end_date: to,
                    }],
                },
                fields: vec![
                    "Award ID",
                    "Recipient Name",
                    amount_field,
                    "Awarding Agency",
                    "Start Date",
                    "Place of Performance State Code",
                ],
                page,
                limit: PAGE_LIMIT,
                sort: amount_field,
                order: "desc",
            };
            let response: AwardSearchResponse = post_json(client, &url, &request).await?;
            awards.extend(
                response
                    .results
                    .into_iter()
                    .filter_map(|row| row.into_award(category, recipient)),
            );
            if !response.page_metadata.is_some_and(|m| m.has_next) {
                break;
            }
        }
        debug!("{} {} awards for {}", awards.len(), category, recipient);
        Ok(awards)
    }

    /// Runs every award-type query. Returns the awards found together with
    /// the groups that failed; fails outright only when every group failed.
    async fn fetch_all(
        &self,
        recipient: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(Vec<Award>, Vec<AwardCategory>)> {
        let client = http_client(USER_AGENT)?;
        let client = &client;
        let results = join_all(AwardCategory::ALL.into_iter().map(|category| async move {
            (
                category,
                self.fetch_category(client, category, recipient, from, to).await,
            )
        }))
        .await;

        let mut awards = Vec::new();
        let mut failures = Vec::new();
        for (category, result) in results {
            match result {
                Ok(found) => awards.extend(found),
                Err(e) => {
                    warn!("Could not load {} awards for {}: {:#}", category, recipient, e);
                    failures.push(category);
                }
            }
        }
        if failures.len() == AwardCategory::ALL.len() {
            return Err(anyhow!("Every award search for {} failed", recipient));
        }
        Ok((awards, failures))
    }
}

#[async_trait]
impl AwardSource for UsaSpendingProvider {
    /// Only complete results are cached. When some award groups fail, a
    /// cached complete copy wins; without one the partial list is returned
    /// uncached.
    #[instrument(name = "UsaSpendingFetch", skip(self))]
    async fn fetch_awards(
        &self,
        recipient: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Award>> {
        let key = format!(
            "spending:{}:{}:{}",
            recipient.trim().to_lowercase(),
            from,
            to
        );
        let mut partial = None;
        let slot = &mut partial;
        let cached = cache::load_or_refresh(
            self.collection.as_ref(),
            &key,
            AWARDS_MAX_AGE,
            self.force_refresh,
            move || async move {
                let (awards, failed) = self.fetch_all(recipient, from, to).await?;
                if failed.is_empty() {
                    return Ok(awards);
                }
                let groups = failed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                *slot = Some(awards);
                Err(anyhow!("Award search incomplete, failed groups: {groups}"))
            },
        )
        .await;

        match (cached, partial) {
            (Ok(cached), _) => Ok(cached.value),
            (Err(e), Some(awards)) => {
                warn!("Showing partial federal awards for {}: {:#}", recipient, e);
                Ok(awards)
            }
            (Err(e), None) => {
                Err(e).with_context(|| format!("Failed to load federal awards for {recipient}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PATH: &str = "/api/v2/search/spending_by_award/";

    async fn mount_group(server: &MockServer, codes: &[&str], body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({"filters": {"award_type_codes": codes}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority(1)
            .mount(server)
            .await;
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2019, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_awards_from_each_group() {
        let server = MockServer::start().await;
        mount_group(
            &server,
            AwardCategory::Contract.codes(),
            json!({
                "results": [
                    {"Award ID": "C-1", "Recipient Name": "ACME CORP", "Award Amount": 2500000.0,
                     "Awarding Agency": "Department of Defense", "Start Date": "2023-11-01",
                     "Place of Performance State Code": "VA"},
                    {"Award ID": "C-2", "Award Amount": 100.0, "Start Date": null}
                ],
                "page_metadata": {"page": 1, "hasNext": false}
            }),
        )
        .await;
        mount_group(
            &server,
            AwardCategory::Loan.codes(),
            json!({
                "results": [
                    {"Award ID": "L-1", "Award Amount": null, "Loan Value": 500000.0,
                     "Awarding Agency": "Small Business Administration", "Start Date": "2021-03-15"}
                ],
                "page_metadata": {"page": 1, "hasNext": false}
            }),
        )
        .await;
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [], "page_metadata": {"hasNext": false}})),
            )
            .mount(&server)
            .await;

        let provider = UsaSpendingProvider::new(&server.uri(), Arc::new(MemoryCollection::new()));
        let (from, to) = dates();
        let mut awards = provider.fetch_awards("Acme", from, to).await.unwrap();
        awards.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(awards.len(), 2);
        assert_eq!(awards[0].id, "C-1");
        assert_eq!(awards[0].category, AwardCategory::Contract);
        assert_eq!(awards[0].state.as_deref(), Some("VA"));
        assert_eq!(awards[1].id, "L-1");
        assert_eq!(awards[1].amount, 500000.0);
        assert_eq!(awards[1].recipient, "Acme");
    }

    #[tokio::test]
    async fn test_all_groups_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = UsaSpendingProvider::new(&server.uri(), Arc::new(MemoryCollection::new()));
        let (from, to) = dates();
        assert!(provider.fetch_awards("Acme", from, to).await.is_err());
    }

    async fn mount_failing_contracts(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(
                json!({"filters": {"award_type_codes": AwardCategory::Contract.codes()}}),
            ))
            .respond_with(ResponseTemplate::new(503))
            .with_priority(1)
            .mount(server)
            .await;
    }

    async fn mount_grants(server: &MockServer) {
        mount_group(
            server,
            AwardCategory::Grant.codes(),
            json!({
                "results": [
                    {"Award ID": "G-1", "Award Amount": 75000.0, "Awarding Agency": "NSF",
                     "Start Date": "2023-05-01"}
                ],
                "page_metadata": {"hasNext": false}
            }),
        )
        .await;
    }

    async fn mount_contracts(server: &MockServer) {
        mount_group(
            server,
            AwardCategory::Contract.codes(),
            json!({
                "results": [
                    {"Award ID": "C-9", "Award Amount": 50000000.0,
                     "Awarding Agency": "Department of Defense", "Start Date": "2023-02-01"}
                ],
                "page_metadata": {"hasNext": false}
            }),
        )
        .await;
    }

    async fn mount_empty_fallback(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [], "page_metadata": {"hasNext": false}})),
            )
            .with_priority(5)
            .mount(server)
            .await;
    }

    fn ids(awards: &[Award]) -> Vec<String> {
        let mut ids: Vec<String> = awards.iter().map(|a| a.id.clone()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_partial_results_are_not_cached() {
        let degraded = MockServer::start().await;
        mount_failing_contracts(&degraded).await;
        mount_grants(&degraded).await;
        mount_empty_fallback(&degraded).await;

        let collection: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        let (from, to) = dates();
        let provider = UsaSpendingProvider::new(&degraded.uri(), Arc::clone(&collection));
        let awards = provider.fetch_awards("Acme", from, to).await.unwrap();
        assert_eq!(ids(&awards), vec!["G-1"]);

        let healthy = MockServer::start().await;
        mount_contracts(&healthy).await;
        mount_grants(&healthy).await;
        mount_empty_fallback(&healthy).await;

        let provider = UsaSpendingProvider::new(&healthy.uri(), Arc::clone(&collection));
        let awards = provider.fetch_awards("Acme", from, to).await.unwrap();
        assert_eq!(ids(&awards), vec!["C-9", "G-1"]);
        assert!(!healthy.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_refresh_keeps_complete_copy() {
        let healthy = MockServer::start().await;
        mount_contracts(&healthy).await;
        mount_grants(&healthy).await;
        mount_empty_fallback(&healthy).await;

        let collection: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        let (from, to) = dates();
        UsaSpendingProvider::new(&healthy.uri(), Arc::clone(&collection))
            .fetch_awards("Acme", from, to)
            .await
            .unwrap();

        let degraded = MockServer::start().await;
        mount_failing_contracts(&degraded).await;
        mount_grants(&degraded).await;
        mount_empty_fallback(&degraded).await;

        let provider =
            UsaSpendingProvider::new(&degraded.uri(), Arc::clone(&collection)).with_refresh(true);
        let awards = provider.fetch_awards("Acme", from, to).await.unwrap();
        assert_eq!(ids(&awards), vec!["C-9", "G-1"]);
    }
}
