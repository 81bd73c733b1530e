use anyhow::{Context, Error, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const USER_AGENT: &str = concat!("omnifolio/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_RETRIES: usize = 2;
pub const RETRY_DELAY_MS: u64 = 500;

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

pub fn http_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

/// Joins `path` onto `base` and appends `params` as the query string.
pub fn endpoint(base: &str, path: &str, params: &[(&str, String)]) -> Result<Url> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    if params.is_empty() {
        return Url::parse(&raw).with_context(|| format!("Invalid URL: {raw}"));
    }
    Url::parse_with_params(&raw, params).with_context(|| format!("Invalid URL: {raw}"))
}

/// GETs `url` with retries on transport errors and error statuses, then
/// decodes the body as JSON.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &Url) -> Result<T> {
    debug!("GET {}", url);
    let response = with_retry(
        || async move { client.get(url.clone()).send().await?.error_for_status() },
        DEFAULT_RETRIES,
        RETRY_DELAY_MS,
    )
    .await
    .with_context(|| format!("Request to {url} failed"))?;

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse response from {url}"))
}

/// GETs `url` with the [`get_json`] retry policy and returns the body text.
pub async fn get_text(client: &reqwest::Client, url: &Url) -> Result<String> {
    debug!("GET {}", url);
    let response = with_retry(
        || async move { client.get(url.clone()).send().await?.error_for_status() },
        DEFAULT_RETRIES,
        RETRY_DELAY_MS,
    )
    .await
    .with_context(|| format!("Request to {url} failed"))?;

    response
        .text()
        .await
        .with_context(|| format!("Failed to read response from {url}"))
}

/// POSTs a JSON body with the same retry policy as [`get_json`].
pub async fn post_json<B, T>(client: &reqwest::Client, url: &Url, body: &B) -> Result<T>
where
    B: serde::Serialize + ?Sized,
    T: DeserializeOwned,
{
    debug!("POST {}", url);
    let response = with_retry(
        || async move {
            client
                .post(url.clone())
                .json(body)
                .send()
                .await?
                .error_for_status()
        },
        DEFAULT_RETRIES,
        RETRY_DELAY_MS,
    )
    .await
    .with_context(|| format!("Request to {url} failed"))?;

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse response from {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Deserialize)]
    struct Pong {
        ok: bool,
    }

    #[test]
    fn test_endpoint_encodes_params() {
        let url = endpoint(
            "https://example.com/",
            "/search",
            &[("q", "S-1/A".to_string()), ("n", "2".to_string())],
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/search?q=S-1%2FA&n=2");

        let url = endpoint("https://example.com", "/plain", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/plain");
    }

    #[tokio::test]
    async fn test_get_json_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(query_param("x", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let client = http_client(USER_AGENT).unwrap();
        let url = endpoint(&server.uri(), "/ping", &[("x", "1".to_string())]).unwrap();
        let pong: Pong = get_json(&client, &url).await.unwrap();
        assert!(pong.ok);
    }

    #[tokio::test]
    async fn test_get_json_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(3)
            .mount(&server)
            .await;

        let client = http_client(USER_AGENT).unwrap();
        let url = endpoint(&server.uri(), "/missing", &[]).unwrap();
        let result: Result<Pong> = get_json(&client, &url).await;
        assert!(result.is_err());
    }
}
