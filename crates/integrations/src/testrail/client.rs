//! HTTP client for the TestRail read-side API. TestRail has no first-party
//! Rust SDK, so this wraps `reqwest` directly the way the GitHub client in
//! this workspace wraps `octocrab` — one struct holding the transport and
//! credentials, with entity fetches living in sibling modules.

use railmigrate_core::config::TestrailConfig;
use railmigrate_harness::circuit_breaker::CircuitBreaker;
use railmigrate_harness::rate_limiter::{RateLimitConfig, RateLimiter};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{IntegrationError, Result};

/// Requests per minute TestRail's documented limit allows before 429s start.
/// Conservative relative to the hard ceiling so normal jitter doesn't trip it.
const TESTRAIL_RPM: u32 = 600;
const MAX_RETRIES: u32 = 5;
/// Pagination safety valve matching the reference importer's cap, in case a
/// TestRail instance has runaway attachment counts.
pub const MAX_ATTACHMENT_ITEMS: u64 = 120_000;

#[derive(Clone)]
pub struct TestrailClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    api_token: String,
    limiter: std::sync::Arc<RateLimiter>,
    breaker: CircuitBreaker,
    /// Session cookie obtained via [`Self::login_session`], needed only for
    /// endpoints (attachment download) that aren't exposed over the token
    /// API and require a logged-in browser-style session instead.
    session_cookie: std::sync::Arc<tokio::sync::Mutex<Option<String>>>,
}

impl TestrailClient {
    pub fn new(config: &TestrailConfig) -> Result<Self> {
        if config.api_token.is_empty() {
            return Err(IntegrationError::MissingCredential("testrail.api_token"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            limiter: std::sync::Arc::new(RateLimiter::new(RateLimitConfig::per_minute(TESTRAIL_RPM))),
            breaker: CircuitBreaker::new(Default::default()),
            session_cookie: std::sync::Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    /// `GET index.php?/api/v2/{endpoint}`, deserialized into `T`, with
    /// retry/backoff on 429 and 5xx, matching the reference client's
    /// `send_request` loop.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}/index.php?/api/v2/{}", self.base_url, endpoint);
        let body = self.send_with_retry(&url).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Like [`Self::get`] but returns the raw JSON value, used by callers
    /// that need to walk a `_link`/pagination envelope themselves.
    pub async fn get_raw(&self, endpoint: &str) -> Result<Value> {
        let url = format!("{}/index.php?/api/v2/{}", self.base_url, endpoint);
        self.send_with_retry(&url).await
    }

    async fn send_with_retry(&self, url: &str) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let outcome = self
                .breaker
                .call(|| async { self.send_once(url).await })
                .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(railmigrate_harness::circuit_breaker::CircuitBreakerError::Open) => {
                    return Err(IntegrationError::CircuitOpen("testrail".to_string()));
                }
                Err(_) if attempt < MAX_RETRIES => {
                    let delay = self.limiter.retry_delay() * attempt;
                    warn!(attempt, ?delay, url, "testrail request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(IntegrationError::Status {
                        status: 0,
                        body: e.to_string(),
                    })
                }
            }
        }
    }

    async fn send_once(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.api_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<Value>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(IntegrationError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Log in through the HTML form (not the token API) to obtain a session
    /// cookie, scraping the CSRF token TestRail embeds as a hidden input.
    /// Needed only for the attachment-download endpoint, which isn't part
    /// of the documented token API.
    pub async fn login_session(&self, password: &str) -> Result<()> {
        let login_page_url = format!("{}/index.php?/auth/login", self.base_url);
        let page = self.http.get(&login_page_url).send().await?.text().await?;
        let csrf_token = extract_csrf_token(&page)
            .ok_or_else(|| IntegrationError::SessionLogin("CSRF token not found".into()))?;

        let response = self
            .http
            .post(&login_page_url)
            .form(&[
                ("name", self.username.as_str()),
                ("password", password),
                ("_token", csrf_token.as_str()),
            ])
            .send()
            .await?;

        let cookie = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("tr_session="))
            .map(|v| v.split(';').next().unwrap_or(v).to_string())
            .ok_or_else(|| IntegrationError::SessionLogin("no session cookie returned".into()))?;

        *self.session_cookie.lock().await = Some(cookie);
        Ok(())
    }

    /// Download an attachment's raw bytes using the session cookie obtained
    /// via [`Self::login_session`].
    pub async fn download_attachment(&self, attachment_id: u64) -> Result<Vec<u8>> {
        let cookie = self
            .session_cookie
            .lock()
            .await
            .clone()
            .ok_or_else(|| IntegrationError::SessionLogin("not logged in".into()))?;

        self.limiter.acquire().await;
        let url = format!(
            "{}/index.php?/attachments/get/{}",
            self.base_url, attachment_id
        );
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IntegrationError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn csrf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name=["']_token["']\s+value=["']([^"']+)["']"#).unwrap()
    })
}

fn extract_csrf_token(html: &str) -> Option<String> {
    csrf_regex()
        .captures(html)
        .map(|c| c[1].to_string())
}

/// Page through a `_link`-style paginated TestRail list endpoint, collecting
/// every item up to [`MAX_ATTACHMENT_ITEMS`] as a safety valve against an
/// instance with runaway attachment counts.
pub async fn paginate_all(
    client: &TestrailClient,
    base_endpoint: &str,
    items_key: &str,
) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut offset = 0u64;
    const PAGE_SIZE: u64 = 250;

    loop {
        // `base_endpoint` is appended to a URL that already has a `?` from
        // `index.php?/api/v2/...`, so every filter beyond the endpoint name
        // itself is joined with `&`.
        let endpoint = format!("{base_endpoint}&limit={PAGE_SIZE}&offset={offset}");
        let page = client.get_raw(&endpoint).await?;
        let batch = page
            .get(items_key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let got = batch.len() as u64;
        items.extend(batch);
        debug!(offset, got, "paginated testrail page");

        if got < PAGE_SIZE || items.len() as u64 >= MAX_ATTACHMENT_ITEMS {
            if items.len() as u64 >= MAX_ATTACHMENT_ITEMS {
                warn!(
                    cap = MAX_ATTACHMENT_ITEMS,
                    "pagination hit the safety cap; remaining items were not fetched"
                );
            }
            break;
        }
        offset += PAGE_SIZE;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_csrf_token_from_hidden_input() {
        let html = r#"<form><input type="hidden" name="_token" value="abc123"></form>"#;
        assert_eq!(extract_csrf_token(html), Some("abc123".to_string()));
    }

    #[test]
    fn missing_csrf_token_returns_none() {
        assert_eq!(extract_csrf_token("<html></html>"), None);
    }
}
