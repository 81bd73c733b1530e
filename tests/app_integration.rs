use omnifolio::AppCommand;
use omnifolio::core::HistoricalPeriod;
use omnifolio::core::calendar::ReleaseValues;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn mount_quote(server: &MockServer, symbol: &str, price: f64, currency: &str) {
        let body = format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "meta": {{
                            "regularMarketPrice": {price},
                            "currency": "{currency}",
                            "shortName": "{symbol} Holding",
                            "chartPreviousClose": {previous}
                        }}
                    }}],
                    "error": null
                }}
            }}"#,
            previous = price * 0.98
        );
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{symbol}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    pub async fn mount_rates(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v6/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"result": "success", "base_code": "USD", "rates": {"USD": 1, "EUR": 0.92, "GBP": 0.79}}"#,
            ))
            .mount(server)
            .await;
    }

    pub async fn market_server() -> MockServer {
        let server = MockServer::start().await;
        mount_quote(&server, "BTC-USD", 60000.0, "USD").await;
        mount_quote(&server, "AAPL", 190.0, "USD").await;
        mount_quote(&server, "SAP.DE", 170.0, "EUR").await;
        mount_rates(&server).await;
        server
    }
}

struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        TestEnv {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn data_path(&self) -> String {
        self.dir.path().join("data").display().to_string()
    }

    fn write_config(&self, body: &str) -> String {
        let path = self.dir.path().join("config.yaml");
        let content = format!("data_path: \"{}\"\n{}", self.data_path(), body);
        fs::write(&path, content).expect("Failed to write config file");
        path.display().to_string()
    }

    fn write_file(&self, name: &str, body: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).expect("Failed to write input file");
        path
    }
}

fn market_config(base_url: &str) -> String {
    format!(
        r#"
currency: "USD"
assets:
  crypto:
    - symbol: "BTC-USD"
      units: 0.5
      purchases:
        - date: 2023-01-10
          amount: 8500
  stocks:
    - symbol: "AAPL"
      units: 10
      purchases:
        - date: 2022-06-01
          amount: 1400
    - symbol: "SAP.DE"
      units: 4
  real_estate:
    - name: "Flat"
      value: 250000
      loan_balance: 150000
      currency: "EUR"
      purchases:
        - date: 2020-03-01
          amount: 60000
  cash:
    - name: "Checking"
      balance: 3000
      kind: checking
  valuables:
    - name: "Guitar"
      value: 1800
  expenses:
    - category: "Rent"
      monthly: 1500
    - category: "Gym"
      monthly: 40
      currency: "GBP"
providers:
  yahoo:
    base_url: "{base_url}"
  exchange_rates:
    base_url: "{base_url}"
"#
    )
}

async fn run(command: AppCommand, config_path: &str) -> anyhow::Result<()> {
    omnifolio::run_command(command, Some(config_path)).await
}

#[test_log::test(tokio::test)]
async fn test_networth_flow_with_mock() {
    let server = test_utils::market_server().await;
    let env = TestEnv::new();
    let config_path = env.write_config(&market_config(&server.uri()));

    let result = run(AppCommand::NetWorth { refresh: false }, &config_path).await;
    assert!(result.is_ok(), "networth failed with: {:?}", result.err());
    assert!(Path::new(&env.data_path()).join("cache").exists());
}

#[test_log::test(tokio::test)]
async fn test_networth_survives_failed_quote() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_rates(&server).await;
    test_utils::mount_quote(&server, "AAPL", 190.0, "USD").await;
    let env = TestEnv::new();
    let config_path = env.write_config(&market_config(&server.uri()));

    // BTC-USD and SAP.DE are not mocked; those rows show errors and the rest renders.
    let result = run(AppCommand::NetWorth { refresh: true }, &config_path).await;
    assert!(result.is_ok(), "networth failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_history_flow_with_mock() {
    let server = test_utils::market_server().await;
    let env = TestEnv::new();
    let config_path = env.write_config(&market_config(&server.uri()));

    let result = run(
        AppCommand::History {
            period: HistoricalPeriod::ThreeYears,
            step_days: 90,
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "history failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_tax_flow() {
    let env = TestEnv::new();
    let config_path = env.write_config(
        r#"
currency: "USD"
tax:
  profile:
    filing_status: married_joint
    wages: 180000
    long_term_gains: 12000
    state_rate: 5
  brackets: ["10%:23200", "12%:94300", "22%:201050", "24%"]
"#,
    );
    let result = run(AppCommand::Tax, &config_path).await;
    assert!(result.is_ok(), "tax failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_tax_without_profile_fails() {
    let env = TestEnv::new();
    let config_path = env.write_config("currency: \"USD\"\n");
    let err = run(AppCommand::Tax, &config_path).await.unwrap_err();
    assert!(err.to_string().contains("No tax section"));
}

#[test_log::test(tokio::test)]
async fn test_calendar_and_release_recording() {
    let env = TestEnv::new();
    let config_path = env.write_config("currency: \"USD\"\n");

    let result = run(
        AppCommand::RecordRelease {
            event_id: "us-cpi".to_string(),
            date: "2024-06-12".parse().unwrap(),
            values: ReleaseValues {
                actual: Some(3.3),
                forecast: Some(3.4),
                previous: None,
            },
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "record-release failed with: {:?}", result.err());

    let result = run(
        AppCommand::Calendar {
            days: 45,
            country: Some("us".to_string()),
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "calendar failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_record_release_rejects_unknown_event() {
    let env = TestEnv::new();
    let config_path = env.write_config("currency: \"USD\"\n");
    let err = run(
        AppCommand::RecordRelease {
            event_id: "moon-gdp".to_string(),
            date: "2024-06-12".parse().unwrap(),
            values: ReleaseValues {
                actual: Some(1.0),
                ..Default::default()
            },
        },
        &config_path,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Unknown economic event"));
}

#[test_log::test(tokio::test)]
async fn test_insider_and_earnings_from_files() {
    let env = TestEnv::new();
    let config_path = env.write_config("currency: \"USD\"\n");
    let today = chrono::Utc::now().date_naive();
    let trades = env.write_file(
        "ACME-insider.json",
        &format!(
            r#"[
                {{"date": "{today}", "insider": "Jane Doe", "role": "ceo", "kind": "P", "shares": 5000, "price": 20.0}},
                {{"date": "{today}", "insider": "John Roe", "role": "director", "kind": "buy", "shares": 1000, "price": 20.5}},
                {{"date": "{today}", "insider": "Fund LP", "role": "ten_percent_owner", "kind": "S", "shares": 200, "price": 21.0}}
            ]"#
        ),
    );
    let result = run(
        AppCommand::Insider {
            ticker: None,
            file: Some(trades),
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "insider failed with: {:?}", result.err());

    let quarters = env.write_file(
        "ACME-earnings.json",
        r#"[
            {"period": "2024-Q1", "reported": "2024-04-25", "eps_actual": 1.10, "eps_estimate": 1.00,
             "revenue_actual": 5200000000, "revenue_estimate": 5100000000},
            {"period": "2023-Q4", "reported": "2024-01-30", "eps_actual": 0.95, "eps_estimate": 0.97,
             "revenue_actual": null, "revenue_estimate": null}
        ]"#,
    );
    let result = run(
        AppCommand::Earnings {
            ticker: None,
            file: Some(quarters),
            estimates: None,
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "earnings failed with: {:?}", result.err());

    let missing = env.dir.path().join("nope.json");
    assert!(
        run(
            AppCommand::Earnings {
                ticker: None,
                file: Some(missing),
                estimates: None,
                refresh: false,
            },
            &config_path
        )
        .await
        .is_err()
    );
}

fn sec_config(base_url: &str) -> String {
    format!(
        r#"
currency: "USD"
providers:
  sec:
    search_url: "{0}"
    submissions_url: "{0}"
    archives_url: "{0}"
    user_agent: "omnifolio-test test@example.com"
"#,
        base_url
    )
}

#[test_log::test(tokio::test)]
async fn test_insider_and_earnings_from_edgar() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let today = chrono::Utc::now().date_naive();
    Mock::given(method("GET"))
        .and(path("/files/company_tickers.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"0": {"cik_str": 777, "ticker": "WIDG", "title": "Widget Corp"}}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/submissions/CIK0000000777.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"name": "Widget Corp", "tickers": ["WIDG"], "exchanges": ["Nasdaq"], "sic": "3674",
                "filings": {{"recent": {{"accessionNumber": ["0001-24-000009"], "form": ["4"],
                "filingDate": ["{today}"], "primaryDocument": ["xslF345X05/form4.xml"]}}}}}}"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/777/000124000009/form4.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<ownershipDocument>
                <reportingOwner>
                    <reportingOwnerId><rptOwnerName>Doe Jane</rptOwnerName></reportingOwnerId>
                    <reportingOwnerRelationship><isOfficer>1</isOfficer><officerTitle>CFO</officerTitle></reportingOwnerRelationship>
                </reportingOwner>
                <nonDerivativeTable>
                    <nonDerivativeTransaction>
                        <transactionDate><value>{today}</value></transactionDate>
                        <transactionCoding><transactionCode>P</transactionCode></transactionCoding>
                        <transactionAmounts>
                            <transactionShares><value>3000</value></transactionShares>
                            <transactionPricePerShare><value>25.10</value></transactionPricePerShare>
                        </transactionAmounts>
                    </nonDerivativeTransaction>
                </nonDerivativeTable>
            </ownershipDocument>"#
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/xbrl/companyfacts/CIK0000000777.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"facts": {"us-gaap": {"EarningsPerShareDiluted": {"units": {"USD/shares": [
                {"start": "2024-01-01", "end": "2024-03-31", "val": 1.10, "filed": "2024-04-25"}
            ]}}}}}"#,
        ))
        .mount(&server)
        .await;

    let env = TestEnv::new();
    let config_path = env.write_config(&sec_config(&server.uri()));

    let result = run(
        AppCommand::Insider {
            ticker: Some("WIDG".to_string()),
            file: None,
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "insider failed with: {:?}", result.err());

    let estimates = env.write_file(
        "estimates.json",
        r#"[{"period": "2024-Q1", "eps_estimate": 1.00, "revenue_estimate": null}]"#,
    );
    let result = run(
        AppCommand::Earnings {
            ticker: Some("widg".to_string()),
            file: None,
            estimates: Some(estimates),
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "earnings failed with: {:?}", result.err());

    let err = run(
        AppCommand::Insider {
            ticker: Some("NOPE".to_string()),
            file: None,
            refresh: false,
        },
        &config_path,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Unknown ticker"));
}

#[test_log::test(tokio::test)]
async fn test_earnings_calendar_with_mock() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let today = chrono::Utc::now().date_naive();
    Mock::given(method("GET"))
        .and(path("/LATEST/search-index"))
        .and(query_param("forms", "8-K"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"hits": {{"total": {{"value": 1}}, "hits": [{{"_source": {{"adsh": "0001-24-000001",
                "form": "8-K", "file_date": "{today}", "items": ["2.02"], "ciks": ["0000000011"],
                "display_names": ["Soft Corp  (SOFT)  (CIK 0000000011)"], "sics": ["7372"]}}}}]}}}}"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/LATEST/search-index"))
        .and(query_param("forms", "10-Q,10-K"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"hits": {"total": {"value": 0}, "hits": []}}"#),
        )
        .mount(&server)
        .await;

    let env = TestEnv::new();
    let config_path = env.write_config(&sec_config(&server.uri()));
    let result = run(
        AppCommand::EarningsCalendar {
            days: 7,
            sector: Some("info".to_string()),
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "earnings calendar failed with: {:?}", result.err());

    let err = run(
        AppCommand::EarningsCalendar {
            days: 7,
            sector: Some("consumer".to_string()),
            refresh: false,
        },
        &config_path,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Ambiguous sector"));
}

#[test_log::test(tokio::test)]
async fn test_lobbying_and_spending_with_mock() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/filings/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"count": 1, "next": null, "results": [{
                "filing_uuid": "f-1", "filing_year": 2024, "filing_period": "first_quarter",
                "income": "120000.00", "expenses": null, "dt_posted": "2024-04-18T09:00:00",
                "registrant": {"name": "Capitol Partners"},
                "lobbying_activities": [{"general_issue_code": "DEF", "government_entities": [{"name": "SENATE"}], "lobbyists": []}]
            }]}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/search/spending_by_award/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"results": [{"Award ID": "W91-1", "Recipient Name": "ACME", "Award Amount": 2500000,
                "Awarding Agency": "Department of Defense", "Start Date": "2024-02-01",
                "Place of Performance State Code": "TX"}],
                "page_metadata": {"page": 1, "hasNext": false}}"#,
        ))
        .mount(&server)
        .await;

    let env = TestEnv::new();
    let config_path = env.write_config(&format!(
        r#"
currency: "USD"
providers:
  lda:
    base_url: "{0}"
  usaspending:
    base_url: "{0}"
"#,
        server.uri()
    ));

    let result = run(
        AppCommand::Lobbying {
            client: "Acme".to_string(),
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "lobbying failed with: {:?}", result.err());

    let result = run(
        AppCommand::Spending {
            recipient: "Acme".to_string(),
            refresh: false,
        },
        &config_path,
    )
    .await;
    assert!(result.is_ok(), "spending failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_missing_config_file_fails() {
    let env = TestEnv::new();
    let path = env.dir.path().join("absent.yaml");
    let err = run(AppCommand::Tax, path.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
