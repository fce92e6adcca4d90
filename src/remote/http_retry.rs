//! HTTP retry for read-only tenant calls.
//!
//! `send_with_retry()` replaces `client.execute(request)` and adds:
//! - Exponential backoff with jitter on 429 (Too Many Requests) and 5xx
//! - Retry-After header parsing (seconds form)
//! - Passthrough for every other status
//!
//! Only GET and HEAD requests are retried. Copy and duplicate calls create
//! objects on the tenant, so they are sent exactly once.

use reqwest::{Client, Method, Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (default: 3)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Parse Retry-After header value (seconds only; HTTP-date is ignored)
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(300)))
}

/// Calculate delay for a given retry attempt with jitter
fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    // 10-30% jitter
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send a request, retrying idempotent ones on 429/5xx.
///
/// The request is rebuilt from its method, URL and headers for each retry.
/// Read calls carry no body, so nothing else needs to be preserved.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    if !is_idempotent(request.method()) {
        return client.execute(request).await;
    }

    let method = request.method().clone();
    let url = request.url().clone();
    let headers = request.headers().clone();

    let mut last_response = client.execute(request).await?;

    for attempt in 0..config.max_retries {
        if !is_retryable_status(last_response.status().as_u16()) {
            return Ok(last_response);
        }

        let delay = parse_retry_after(&last_response)
            .unwrap_or_else(|| calculate_delay(attempt, config));

        tracing::debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            method,
            url,
            last_response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;

        last_response = client
            .request(method.clone(), url.clone())
            .headers(headers.clone())
            .send()
            .await?;
    }

    Ok(last_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_status() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [200, 201, 400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn test_only_reads_are_idempotent() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::HEAD));
        assert!(!is_idempotent(&Method::POST));
        assert!(!is_idempotent(&Method::PATCH));
    }

    #[test]
    fn test_calculate_delay_bounded() {
        let config = HttpRetryConfig::default();
        for attempt in 0..10 {
            let delay = calculate_delay(attempt, &config);
            // cap plus at most 30% jitter
            assert!(delay.as_millis() <= (config.max_delay_ms as u128 * 13 / 10));
            assert!(delay.as_millis() >= config.base_delay_ms as u128);
        }
    }
}
