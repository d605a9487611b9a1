//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. The clients in this
//! module tree never interpret status codes.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{DumpError, DumpResult};

use super::USER_AGENT_VALUE;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// HTTP backend shared by the backend and gateway clients.
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) max_retries: u32,
}

impl HttpBackend {
    pub(crate) fn new(base_url: &str, timeout: Duration, max_retries: u32) -> DumpResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| DumpError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> DumpResult<T> {
        let url = self.url(path);
        let response = self.request(reqwest::Method::GET, &url, None).await?;
        parse_json(response, &url).await
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> DumpResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let body = serde_json::to_value(body).map_err(|e| DumpError::InvalidResponse {
            message: format!("failed to serialize request body: {}", e),
        })?;
        let response = self
            .request(reqwest::Method::POST, &url, Some(&body))
            .await?;
        parse_json(response, &url).await
    }

    /// Make a request, retrying transient failures up to `max_retries` times.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> DumpResult<reqwest::Response> {
        let mut attempt = 0;

        loop {
            let error = match self.request_once(method.clone(), url, body).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if attempt >= self.max_retries || !should_retry(&method, &error) {
                return Err(error);
            }
            attempt += 1;

            let delay = backoff_delay(attempt, &error);
            warn!(
                %method,
                url,
                error = %error,
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> DumpResult<reqwest::Response> {
        let mut request = self.client.request(method, url);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => Err(DumpError::Unauthorized {
                message: format!("HTTP {}", status.as_u16()),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(DumpError::RateLimited { retry_after })
            }

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(DumpError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}

/// A throttled request was never processed, so any method may resend it.
/// A 5xx answer to a POST may come after the body was applied.
fn should_retry(method: &reqwest::Method, error: &DumpError) -> bool {
    error.is_retryable()
        && (method.is_idempotent() || matches!(error, DumpError::RateLimited { .. }))
}

/// Delay before retry `attempt` (1-based).
fn backoff_delay(attempt: u32, error: &DumpError) -> Duration {
    use rand::Rng;

    let mut rng = rand::thread_rng();

    if let DumpError::RateLimited {
        retry_after: Some(after),
    } = error
    {
        let hinted = (*after).min(MAX_BACKOFF).mul_f64(rng.gen_range(0.9..=1.1));
        return hinted.max(Duration::from_millis(100));
    }

    let ceiling = Duration::from_secs(1u64 << attempt.min(5)).min(MAX_BACKOFF);
    ceiling
        .mul_f64(rng.gen_range(0.0..=1.0))
        .max(Duration::from_millis(10))
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> DumpResult<T> {
    response
        .json()
        .await
        .map_err(|e| DumpError::InvalidResponse {
            message: format!("failed to parse response from {}: {}", url, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let http = HttpBackend::new("https://example.test/api/", Duration::from_secs(1), 0).unwrap();
        assert_eq!(http.url("KnownDepots"), "https://example.test/api/KnownDepots");
        assert_eq!(http.url("/SubmitTokens"), "https://example.test/api/SubmitTokens");
    }

    fn server_error() -> DumpError {
        DumpError::Network {
            message: "HTTP 503: unavailable".into(),
        }
    }

    #[test]
    fn test_post_not_retried_on_server_error() {
        assert!(should_retry(&reqwest::Method::GET, &server_error()));
        assert!(!should_retry(&reqwest::Method::POST, &server_error()));
    }

    #[test]
    fn test_post_retried_when_throttled() {
        let throttled = DumpError::RateLimited { retry_after: None };
        assert!(should_retry(&reqwest::Method::POST, &throttled));
        assert!(!should_retry(
            &reqwest::Method::GET,
            &DumpError::Unauthorized {
                message: "HTTP 401".into()
            }
        ));
    }

    #[test]
    fn test_backoff_bounds() {
        let throttled = DumpError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        };
        let delay = backoff_delay(1, &throttled);
        assert!(delay >= Duration::from_secs(27) && delay <= Duration::from_secs(33));

        for attempt in 1..=10 {
            let delay = backoff_delay(attempt, &server_error());
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= MAX_BACKOFF);
        }
    }
}
