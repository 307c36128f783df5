//! Thin, reentrant HTTP GET/POST wrapper shared by every provider and the
//! live Order Executor. Per-host caching is
//! disabled (reqwest already doesn't cache by default); this module's job
//! is to normalize transport/5xx/401/429 into the crate's error taxonomy
//! instead of letting each caller re-derive it.

use crate::error::{BotError, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GET `url` and JSON-decode the body. Retries transient (5xx/timeout)
    /// failures up to 2 times with jittered backoff inside this single
    /// call; surfaces 429 as
    /// `BotError::RateLimited` and 401 as `BotError::Auth` without retry.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request_json(Method::GET, url, None).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: reqwest::header::HeaderMap,
        body: &str,
    ) -> Result<T> {
        let mut req = self.client.request(Method::POST, url).headers(headers);
        req = req.body(body.to_string());
        let response = req.send().await?;
        self.decode(response).await
    }

    /// GET with caller-supplied auth headers (L1/L2 signed requests), no
    /// retry-on-5xx: auth derivation and order placement must never be
    /// silently retried with a stale timestamp signature.
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: reqwest::header::HeaderMap,
    ) -> Result<T> {
        let response = self.client.request(Method::GET, url).headers(headers).send().await?;
        self.decode(response).await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<T> {
        const MAX_RETRIES: u32 = 2;
        let mut attempt = 0;
        loop {
            let mut req = self.client.request(method.clone(), url);
            if let Some(b) = body {
                req = req.body(b.to_string());
            }
            let result = req.send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(BotError::RateLimited(url.to_string()));
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(BotError::Auth(format!("401 from {url}")));
                    }
                    if status.is_server_error() && attempt < MAX_RETRIES {
                        attempt += 1;
                        let backoff = jittered_backoff(attempt);
                        warn!(%url, %status, attempt, "transient 5xx, retrying after backoff");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return self.decode(response).await;
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = jittered_backoff(attempt);
                    warn!(%url, attempt, error = %e, "transient transport error, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(BotError::TransientNetwork(e.to_string()));
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(BotError::InvalidMarketData(format!(
                "non-success status {status} from {url}"
            )));
        }
        debug!(len = bytes.len(), "decoding json response");
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn jittered_backoff(attempt: u32) -> Duration {
    let base_ms = 200u64 * 2u64.pow(attempt - 1);
    let jitter_ms = rand::random::<u64>() % 100;
    Duration::from_millis(base_ms + jitter_ms)
}
