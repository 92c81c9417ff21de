//! Shared blocking HTTP client. Requests are spaced out and transient failures retried.

use reqwest::blocking::Response;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("mdpack/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// MangaDex allows roughly five requests per second per client.
const DEFAULT_DELAY_MS: u64 = 250;
const DEFAULT_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MS: [u64; 4] = [200, 400, 800, 1600];
/// Wait used for a 429 that names no reset time.
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(5);
const RATE_LIMIT_CAP: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 10;
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-retry-after";

/// Minimum spacing between consecutive requests.
#[derive(Debug)]
struct Throttle {
    spacing: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.spacing {
                std::thread::sleep(self.spacing - elapsed);
            }
        }
    }

    fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RetryPolicy {
    attempts: u32,
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based). The last step repeats.
    fn delay_for(&self, retry: u32) -> Duration {
        self.backoff
            .get(retry as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::from_millis(DEFAULT_BACKOFF_MS[0]))
    }
}

/// How long a 429 response asks us to wait, from MangaDex's reset timestamp or `Retry-After`.
fn rate_limit_wait(headers: &HeaderMap, now: SystemTime) -> Duration {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };
    let wait = if let Some(reset) = header_u64(RATE_LIMIT_RESET_HEADER) {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Duration::from_secs(reset.saturating_sub(now_secs).max(1))
    } else if let Some(secs) = header_u64(RETRY_AFTER.as_str()) {
        Duration::from_secs(secs)
    } else {
        RATE_LIMIT_FALLBACK
    };
    wait.min(RATE_LIMIT_CAP)
}

/// Blocking HTTP client shared by every catalog request in a run.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl PoliteClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// GET `url`, retrying connection errors, timeouts, 5xx, and 429.
    ///
    /// Any other status is handed back for the caller to judge. When attempts run out the
    /// last response or error is returned.
    pub fn get_with_retry(&mut self, url: &str) -> Result<Response, reqwest::Error> {
        let mut retry = 0u32;
        loop {
            self.throttle.wait();
            debug!(url, retry, "GET");
            let outcome = self.inner.get(url).send();
            self.throttle.mark();
            let exhausted = retry + 1 >= self.retry.attempts;

            let pause = match &outcome {
                Ok(resp) if resp.status().as_u16() == 429 => {
                    Some(rate_limit_wait(resp.headers(), SystemTime::now()))
                }
                Ok(resp) if resp.status().is_server_error() => Some(self.retry.delay_for(retry)),
                Ok(_) => None,
                Err(e) if e.is_timeout() || e.is_connect() => Some(self.retry.delay_for(retry)),
                Err(_) => None,
            };
            match pause {
                Some(pause) if !exhausted => {
                    match &outcome {
                        Ok(resp) => warn!(url, status = resp.status().as_u16(), ?pause, "retrying"),
                        Err(e) => warn!(url, error = %e, ?pause, "retrying"),
                    }
                    std::thread::sleep(pause);
                    retry += 1;
                }
                _ => return outcome,
            }
        }
    }
}

/// Builder for [PoliteClient]. Unset fields keep MangaDex-friendly defaults.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
    attempts: u32,
    backoff: Option<Vec<Duration>>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_ms: DEFAULT_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            attempts: DEFAULT_ATTEMPTS,
            backoff: None,
        }
    }
}

impl PoliteClientBuilder {
    /// Defaults to `mdpack/<version>`.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Total attempts per request, including the first. Clamped to at least 1.
    pub fn retry_count(mut self, n: u32) -> Self {
        self.attempts = n.max(1);
        self
    }

    /// Waits between attempts, in seconds. An empty list doubles from one second.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.backoff = Some(if secs.is_empty() {
            let steps = self.attempts.saturating_sub(1);
            (0..steps)
                .map(|i| Duration::from_secs(1u64 << i.min(4)))
                .collect()
        } else {
            secs.into_iter().map(Duration::from_secs).collect()
        });
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff = self.backoff.unwrap_or_else(|| {
            DEFAULT_BACKOFF_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect()
        });
        Ok(PoliteClient {
            inner,
            throttle: Throttle {
                spacing: Duration::from_millis(self.delay_ms),
                last: None,
            },
            retry: RetryPolicy {
                attempts: self.attempts,
                backoff,
            },
        })
    }
}
