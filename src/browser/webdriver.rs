//! [`PageDriver`] backed by a WebDriver session (chromedriver or msedgedriver).
//!
//! The driver binary must already be listening at the configured URL, e.g.
//! `chromedriver --port=9515`. PDF printing goes through the Chrome DevTools
//! `Page.printToPDF` command, so only Chromium-based browsers are supported.

use super::{PageDriver, is_accept_label};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const CONSENT_SETTLE: Duration = Duration::from_millis(500);

/// Which Chromium flavour to ask the WebDriver server for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Edge,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Browser::Chrome => "chrome",
            Browser::Edge => "edge",
        })
    }
}

/// Settings for opening a browser session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub browser: Browser,
    pub webdriver_url: String,
    pub headless: bool,
    pub page_timeout: Duration,
    pub user_agent: Option<String>,
}

fn apply_args<C: ChromiumLikeCapabilities>(
    caps: &mut C,
    options: &BrowserOptions,
) -> WebDriverResult<()> {
    if options.headless {
        caps.add_arg("--headless=new")?;
    }
    caps.add_arg("--disable-gpu")?;
    caps.add_arg("--no-sandbox")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--window-size=1400,1000")?;
    if let Some(ua) = &options.user_agent {
        caps.add_arg(&format!("--user-agent={ua}"))?;
    }
    Ok(())
}

/// A live browser tab driven over WebDriver.
pub struct WebDriverPage {
    driver: WebDriver,
}

impl fmt::Debug for WebDriverPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverPage").finish_non_exhaustive()
    }
}

impl WebDriverPage {
    /// Open a new session. Failure here is fatal for a run.
    #[instrument(level = "info", skip_all, fields(browser = %options.browser, url = %options.webdriver_url))]
    pub async fn connect(options: &BrowserOptions) -> Result<Self, Box<dyn Error>> {
        let driver = match options.browser {
            Browser::Chrome => {
                let mut caps = DesiredCapabilities::chrome();
                apply_args(&mut caps, options)?;
                WebDriver::new(options.webdriver_url.as_str(), caps).await?
            }
            Browser::Edge => {
                let mut caps = DesiredCapabilities::edge();
                apply_args(&mut caps, options)?;
                WebDriver::new(options.webdriver_url.as_str(), caps).await?
            }
        };
        driver.set_page_load_timeout(options.page_timeout).await?;
        info!(headless = options.headless, "Browser session started");
        Ok(Self { driver })
    }

    async fn ready_state(&self) -> Result<String, Box<dyn Error>> {
        let ret = self
            .driver
            .execute("return document.readyState", Vec::new())
            .await?;
        Ok(ret.json().as_str().unwrap_or_default().to_string())
    }
}

impl PageDriver for WebDriverPage {
    #[instrument(level = "debug", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<(), Box<dyn Error>> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), Box<dyn Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ready_state().await? == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(format!("page not ready after {timeout:?}").into());
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn current_html(&mut self) -> Result<String, Box<dyn Error>> {
        Ok(self.driver.source().await?)
    }

    async fn title(&mut self) -> Option<String> {
        match self.driver.title().await {
            Ok(title) => Some(title.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, "Title unavailable");
                None
            }
        }
    }

    async fn visible_text(&mut self) -> String {
        match self
            .driver
            .execute("return document.body ? document.body.innerText : ''", Vec::new())
            .await
        {
            Ok(ret) => ret.json().as_str().unwrap_or_default().to_string(),
            Err(e) => {
                debug!(error = %e, "Visible text unavailable");
                String::new()
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn print_to_pdf(&mut self) -> Result<Vec<u8>, Box<dyn Error>> {
        let dev_tools = ChromeDevTools::new(self.driver.handle.clone());
        let ret = dev_tools
            .execute_cdp_with_params(
                "Page.printToPDF",
                json!({ "printBackground": true, "preferCSSPageSize": true }),
            )
            .await?;
        let data = ret
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or("Page.printToPDF returned no data")?;
        Ok(BASE64.decode(data)?)
    }

    async fn screenshot(&mut self) -> Option<Vec<u8>> {
        match self.driver.screenshot_as_png().await {
            Ok(png) => Some(png),
            Err(e) => {
                debug!(error = %e, "Screenshot failed");
                None
            }
        }
    }

    async fn dismiss_cookie_consent(&mut self) {
        let mut candidates = Vec::new();
        for tag in ["button", "a"] {
            match self.driver.find_all(By::Tag(tag)).await {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    debug!(error = %e, tag, "Consent lookup failed");
                    return;
                }
            }
        }
        for element in candidates {
            let Ok(text) = element.text().await else {
                continue;
            };
            if is_accept_label(&text) {
                if let Err(e) = element.click().await {
                    debug!(error = %e, label = %text.trim(), "Consent click failed");
                } else {
                    debug!(label = %text.trim(), "Dismissed cookie consent");
                    sleep(CONSENT_SETTLE).await;
                }
                return;
            }
        }
    }

    async fn quit(self) -> Result<(), Box<dyn Error>> {
        if let Err(e) = self.driver.quit().await {
            warn!(error = %e, "Browser did not shut down cleanly");
            return Err(e.into());
        }
        info!("Browser session closed");
        Ok(())
    }
}
