//! Fetching search result pages, over plain HTTP or through the browser.
//!
//! # Architecture
//!
//! - [`PageSource`]: anything that can turn a URL into markup
//! - [`HttpFetcher`]: `reqwest` client with a browser-like User-Agent
//! - [`RetryFetch`]: decorator adding exponential backoff to any [`PageSource`]
//! - [`BrowserSource`]: loads the page in the run's [`PageDriver`] and returns
//!   the rendered markup
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter
//! ```
//!
//! The search path uses 2 retries (3 attempts) from a 2 second base.

use crate::browser::PageDriver;
use crate::utils::{pause, truncate_for_log};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// User-Agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// Retries after the first failed search fetch.
pub const SEARCH_RETRIES: usize = 2;
/// Backoff before the first retry; doubled for each further one.
pub const SEARCH_RETRY_BASE: Duration = Duration::from_secs(2);

/// Something that can produce the markup behind a URL.
pub trait PageSource {
    async fn fetch_page(&mut self, url: &str) -> Result<String, Box<dyn Error>>;
}

/// Plain HTTP fetcher for search pages.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&mut self, url: &str) -> Result<String, Box<dyn Error>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        debug!(bytes = body.len(), "Fetched search page");
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PageSource`].
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: PageSource> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Jitter is at most a quarter of the base delay, capped at 250ms.
    fn jitter(&self) -> Duration {
        let cap = (self.base_delay.as_millis() / 4).min(250) as u64;
        Duration::from_millis(rng().random_range(0..=cap))
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: PageSource> PageSource for RetryFetch<T> {
    #[instrument(level = "info", skip(self))]
    async fn fetch_page(&mut self, url: &str) -> Result<String, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %truncate_for_log(&e.to_string(), 300),
                            "Search fetch exhausted retries"
                        );
                        return Err(format!("failed to fetch search page {url}: {e}").into());
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let delay = delay + self.jitter();
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "Search fetch failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Loads search pages in the run's browser so scripted result lists render.
pub struct BrowserSource<'a, D> {
    driver: &'a mut D,
    wait_timeout: Duration,
    pause_after_load: bool,
}

impl<'a, D: PageDriver> BrowserSource<'a, D> {
    pub fn new(driver: &'a mut D, wait_timeout: Duration, pause_after_load: bool) -> Self {
        Self {
            driver,
            wait_timeout,
            pause_after_load,
        }
    }
}

impl<D: PageDriver> PageSource for BrowserSource<'_, D> {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&mut self, url: &str) -> Result<String, Box<dyn Error>> {
        self.driver.navigate(url).await?;
        self.driver.wait_until_ready(self.wait_timeout).await?;
        self.driver.dismiss_cookie_consent().await;
        let html = self.driver.current_html().await?;
        if self.pause_after_load {
            pause("Search page loaded. Press Enter to continue...").await;
        }
        Ok(html)
    }
}
