use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
/// Rate-limited responses back off much harder than plain transient errors.
const RATE_LIMIT_BACKOFF_FACTOR: u64 = 4;
const TRANSIENT_BACKOFF_FACTOR: u64 = 2;

/// Ordinary browser headers; target sites serve degraded or blocked pages
/// to default library user agents.
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Response-body phrases some sites use for soft rate limiting behind a 200.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "too many requests",
    "rate limit exceeded",
    "temporarily blocked",
    "access denied - request throttled",
];

#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP 404. Terminal for the URL; never retried.
    #[error("not found: {0}")]
    NotFound(String),
    /// HTTP 429 or a recognized throttle body, after retries with
    /// elongated backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Network error or other non-2xx status, after bounded retries.
    /// The URL is skipped for this run, not failed permanently.
    #[error("transient failure: {0}")]
    Transient(String),
}

pub struct Fetched {
    pub body: String,
    pub status: u16,
    pub latency_ms: i64,
}

/// Rate-limited HTTP fetcher. One instance per target site; it owns the
/// politeness clock, so every call through it respects the minimum
/// inter-request delay (discovery and checklist fetches alike).
pub struct Fetcher {
    client: reqwest::Client,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl Fetcher {
    pub fn new(min_delay_ms: u64) -> anyhow::Result<Fetcher> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Fetcher {
            client,
            min_delay: Duration::from_millis(min_delay_ms),
            last_request: None,
        })
    }

    /// Fetch one page. 404 returns immediately; everything else retries up
    /// to the bound with exponential backoff before surfacing an error.
    pub async fn fetch(&mut self, url: &str) -> Result<Fetched, FetchError> {
        let mut last_err = FetchError::Transient("no attempt made".into());

        for attempt in 0..=MAX_RETRIES {
            self.politeness_delay().await;

            let start = Instant::now();
            let response = self.client.get(url).send().await;
            self.last_request = Some(Instant::now());
            let latency_ms = start.elapsed().as_millis() as i64;

            let err = match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound(url.to_string()));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        FetchError::RateLimited(format!("{} returned 429", url))
                    } else if status.is_success() {
                        match resp.text().await {
                            Ok(body) => {
                                if let Some(marker) = rate_limit_marker(&body) {
                                    FetchError::RateLimited(format!(
                                        "{} body contains '{}'",
                                        url, marker
                                    ))
                                } else {
                                    return Ok(Fetched {
                                        body,
                                        status: status.as_u16(),
                                        latency_ms,
                                    });
                                }
                            }
                            Err(e) => FetchError::Transient(format!("body read failed: {}", e)),
                        }
                    } else {
                        FetchError::Transient(format!("{} returned {}", url, status))
                    }
                }
                Err(e) => FetchError::Transient(format!("request failed: {}", e)),
            };

            if attempt < MAX_RETRIES {
                let factor = match err {
                    FetchError::RateLimited(_) => RATE_LIMIT_BACKOFF_FACTOR,
                    _ => TRANSIENT_BACKOFF_FACTOR,
                };
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * factor.pow(attempt));
                warn!(
                    "{} (attempt {}/{}), backing off {:.1}s",
                    err,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64()
                );
                sleep(backoff).await;
            }
            last_err = err;
        }

        Err(last_err)
    }

    async fn politeness_delay(&self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                sleep(self.min_delay - elapsed).await;
            }
        }
    }
}

fn rate_limit_marker(body: &str) -> Option<&'static str> {
    // Only worth scanning short bodies; real checklist pages are large
    if body.len() > 20_000 {
        return None;
    }
    let lower = body.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .find(|m| lower.contains(**m))
        .copied()
}
