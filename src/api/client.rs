//! Rate-limited HTTP client.
//!
//! Every outbound request runs through the [`RateLimiter`]'s protocol: gate
//! before each attempt, feed every received response to `observe`, release
//! probe duty with `relinquish` when the transport fails. Per attempt exactly
//! one of {observe, relinquish-and-retry, relinquish-and-error} happens.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use url::Url;

use crate::api::rate_limit::RateLimiter;
use crate::error::{Error, Result};

/// Connect/read timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections kept per host.
const POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Base delay between retry attempts; a random jitter of the same magnitude
/// is added on top.
const RETRY_BACKOFF_MS: u64 = 200;

/// HTTP client wrapper shared by the API and the download stage.
pub struct XClient {
    http: Client,
    limiter: Arc<RateLimiter>,
    retry_count: u32,
}

impl XClient {
    pub fn new(headers: HeaderMap, limiter: Arc<RateLimiter>, retry_count: u32) -> Result<Self> {
        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()?;
        Ok(XClient {
            http,
            limiter,
            retry_count,
        })
    }

    /// Issue a GET and return the successful response.
    ///
    /// Non-2xx statuses become errors after the limiter has observed the
    /// response headers, so a 429's quota information still reaches waiters.
    pub async fn get(&self, url: &Url) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.gate(url).await;
            tracing::debug!("GET {}", url);

            match self.http.get(url.clone()).send().await {
                Ok(response) => {
                    self.limiter.observe(url, response.headers());

                    let status = response.status();
                    if status.as_u16() == 429 {
                        return Err(Error::RateLimited {
                            path: url.path().to_string(),
                        });
                    }
                    if !status.is_success() {
                        return Err(Error::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    return Ok(response);
                }
                Err(err) => {
                    self.limiter.relinquish(url);
                    if attempt < self.retry_count && Self::retry_on_error(url) {
                        attempt += 1;
                        let jitter = rand::thread_rng().gen_range(0..RETRY_BACKOFF_MS);
                        let backoff =
                            Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt) + jitter);
                        tracing::warn!(
                            "attempt {}/{} to {} failed ({}), retrying in {:?}",
                            attempt,
                            self.retry_count,
                            url,
                            err,
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    /// GET a JSON body.
    pub async fn get_json(&self, url: &Url) -> Result<serde_json::Value> {
        let response = self.get(url).await?;
        Ok(response.json().await?)
    }

    /// Network errors against the media CDN are not retried; its downloads
    /// are re-attempted wholesale on the next run instead.
    fn retry_on_error(url: &Url) -> bool {
        RateLimiter::should_limit(url)
    }
}
