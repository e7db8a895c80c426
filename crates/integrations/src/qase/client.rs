//! HTTP client for the Qase write-side API. Like the TestRail client, this
//! wraps `reqwest` directly since no vendor SDK crate exists; the shape
//! (client struct holding transport + credentials, retry/backoff in one
//! place) mirrors `TestrailClient`.

use railmigrate_core::config::QaseConfig;
use railmigrate_harness::circuit_breaker::CircuitBreaker;
use railmigrate_harness::pool::TargetPool;
use railmigrate_harness::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{IntegrationError, Result};

const MAX_RETRIES: u32 = 5;

#[derive(Clone)]
pub struct QaseClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    limiter: std::sync::Arc<RateLimiter>,
    pool: TargetPool,
    breaker: CircuitBreaker,
}

impl QaseClient {
    pub fn new(config: &QaseConfig) -> Result<Self> {
        if config.api_token.is_empty() {
            return Err(IntegrationError::MissingCredential("qase.api_token"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            limiter: std::sync::Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
                config.requests_per_minute,
            ))),
            pool: TargetPool::new(),
            breaker: CircuitBreaker::new(Default::default()),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.request(Method::GET, path, None::<&()>).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let value = self.request(Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let value = self.request(Method::PATCH, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let _permit = self.pool.acquire().await;
            self.limiter.acquire().await;

            let outcome = self
                .breaker
                .call(|| async { self.send_once(method.clone(), path, body).await })
                .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(railmigrate_harness::circuit_breaker::CircuitBreakerError::Open) => {
                    return Err(IntegrationError::CircuitOpen("qase".to_string()));
                }
                Err(_) if attempt < MAX_RETRIES => {
                    let delay = self.limiter.retry_delay() * attempt;
                    warn!(attempt, ?delay, path, "qase request failed, retrying");
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

    async fn send_once<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .header("Token", &self.api_token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
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

    /// Multipart upload used by the attachment importer; kept separate from
    /// [`Self::request`] since it needs a different request builder and
    /// never retries a partially-streamed body.
    pub async fn upload_attachment(
        &self,
        project_code: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        let _permit = self.pool.acquire().await;
        self.limiter.acquire().await;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/attachment/{}", self.base_url, project_code);
        let response = self
            .http
            .post(&url)
            .header("Token", &self.api_token)
            .multipart(form)
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
}
