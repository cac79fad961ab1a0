//! HTTP client shared by the provider adapters.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::sources::SourceError;
use crate::utils::retry::{with_retry, RetryConfig};

/// Longest error body kept in an [`SourceError::Api`] message
const MAX_ERROR_BODY: usize = 300;

/// reqwest client with timeouts, a user agent, optional client-side rate limiting and
/// retry of transient failures.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    retry: RetryConfig,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("rate_limited", &self.limiter.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpClient {
    /// Create a client from HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: None,
            retry: RetryConfig::default(),
        })
    }

    /// Limit outgoing requests to `per_second`; `None` or a non-positive rate disables limiting
    pub fn with_rate_limit(mut self, per_second: Option<f32>) -> Self {
        self.limiter = per_second
            .filter(|rps| rps.is_finite() && *rps > 0.0)
            .and_then(|rps| Quota::with_period(Duration::from_secs_f32(1.0 / rps)))
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(nonzero!(1u32)))));
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET a URL and decode the JSON body
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(&'static str, String)],
    ) -> Result<serde_json::Value, SourceError> {
        with_retry(self.retry, move || async move {
            let response = self.send(self.request(url, query, headers)).await?;
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(SourceError::from)
        })
        .await
    }

    /// GET a URL and return the body as text
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(&'static str, String)],
    ) -> Result<String, SourceError> {
        with_retry(self.retry, move || async move {
            let response = self.send(self.request(url, query, headers)).await?;
            Ok(response.text().await?)
        })
        .await
    }

    fn request(&self, url: &str, query: &[(String, String)], headers: &[(&'static str, String)]) -> RequestBuilder {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, retry_after, &body))
    }
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> SourceError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Auth(format!("{} {}", status.as_u16(), message.trim()))
        }
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimit { retry_after },
        _ => SourceError::Api {
            status: status.as_u16(),
            message: message.trim().to_string(),
        },
    }
}
