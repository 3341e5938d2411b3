// src/http.rs
//! Shared outbound HTTP client used by every collector.
//!
//! Transient upstream failures (5xx, connection reset, timeout) are retried
//! with exponential backoff. Non-retryable statuses (4xx including 429) are
//! handed back to the caller unchanged so each collector can apply its own
//! policy, e.g. logging rate limits distinctly.

use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "aifeed/0.1 (AI research aggregator)";

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        let inner = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { inner, policy }
    }

    /// GET with retry. Returns the response for *any* HTTP status once the
    /// retry budget for 5xx is exhausted; transport errors that outlive the
    /// budget propagate as `Err`.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let mut req = self.inner.get(url).query(query);
            if let Some(t) = timeout {
                req = req.timeout(t);
            }

            match req.send().await {
                Ok(resp) => {
                    if resp.status().is_server_error() && attempt < self.policy.max_retries {
                        tracing::warn!(
                            url,
                            status = %resp.status(),
                            attempt = attempt + 1,
                            "server error, retrying"
                        );
                        counter!("http_retries_total").increment(1);
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout() || e.is_request();
                    if transient && attempt < self.policy.max_retries {
                        tracing::warn!(
                            url,
                            error = %e,
                            attempt = attempt + 1,
                            "transport error, retrying"
                        );
                        counter!("http_retries_total").increment(1);
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e).with_context(|| format!("GET {url}"));
                }
            }
        }
    }

    /// GET returning the response body as text; non-success statuses become
    /// errors carrying the status code.
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<String> {
        let resp = self.get(url, query, timeout).await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        resp.text().await.with_context(|| format!("GET {url} body"))
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
