use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::{ResolvedConfig, RetryConfig};
use crate::domain::SourceKey;
use crate::error::MedError;

/// Bounded exponential backoff for transient network failures.
///
/// The policy is a plain value so call sites and tests can inspect it;
/// `retryable` decides which request errors are worth another attempt.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub retryable: fn(&reqwest::Error) -> bool,
}

impl RetryPolicy {
    pub fn from_config(retry: &RetryConfig) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            min_backoff: Duration::from_secs(retry.min_backoff_secs),
            max_backoff: Duration::from_secs(retry.max_backoff_secs),
            retryable: is_transient_error,
        }
    }

    /// Delay before retry number `attempt` (zero-based): min * 2^attempt,
    /// capped at max.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.min_backoff
            .checked_mul(factor)
            .map(|delay| delay.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }
}

pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// How long to pause so that at least `min_interval` elapses between
/// consecutive requests to one source.
fn rate_limit_pause(last: Option<Instant>, min_interval: Duration, now: Instant) -> Duration {
    match last {
        Some(last) => min_interval.saturating_sub(now.duration_since(last)),
        None => Duration::ZERO,
    }
}

/// Blocking request executor shared by all source fetchers. Respects a
/// per-source minimum inter-request interval and retries transient
/// network failures per the configured policy.
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
    min_intervals: HashMap<String, Duration>,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl Transport {
    pub fn new(config: &ResolvedConfig) -> Result<Self, MedError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("medcorpus/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MedError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| MedError::SourceHttp {
                source_name: "transport".to_string(),
                message: err.to_string(),
            })?;

        let min_intervals = config
            .jobs
            .iter()
            .map(|job| {
                (
                    job.key.as_str().to_string(),
                    config.rate_limit_delay(&job.key),
                )
            })
            .collect();

        Ok(Self {
            client,
            policy: RetryPolicy::from_config(&config.retry),
            min_intervals,
            last_request: Mutex::new(HashMap::new()),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` on behalf of `source`, blocking until the rate-limit
    /// delay has elapsed and a response is obtained or retries are
    /// exhausted. Non-success statuses are returned as errors without
    /// retrying; only transient network failures are re-attempted.
    pub fn request(
        &self,
        source: &SourceKey,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::blocking::Response, MedError> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_slot(source);
            let result = self.client.get(url).query(params).send();
            match result {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let message = response
                            .text()
                            .unwrap_or_else(|_| "request failed".to_string());
                        return Err(MedError::SourceStatus {
                            source_name: source.as_str().to_string(),
                            status,
                            message,
                        });
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let attempts_left = attempt + 1 < self.policy.max_attempts;
                    if attempts_left && (self.policy.retryable)(&err) {
                        let delay = self.policy.backoff_delay(attempt);
                        debug!(
                            source = source.as_str(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "transient request failure, backing off"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(MedError::SourceHttp {
                        source_name: source.as_str().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn wait_for_slot(&self, source: &SourceKey) {
        let min_interval = self
            .min_intervals
            .get(source.as_str())
            .copied()
            .unwrap_or(Duration::ZERO);
        let pause = {
            let guard = self.last_request.lock().unwrap();
            rate_limit_pause(guard.get(source.as_str()).copied(), min_interval, Instant::now())
        };
        if !pause.is_zero() {
            thread::sleep(pause);
        }
        let mut guard = self.last_request.lock().unwrap();
        guard.insert(source.as_str().to_string(), Instant::now());
    }
}
