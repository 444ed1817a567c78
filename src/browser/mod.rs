//! Page rendering capability.
//!
//! [`PageDriver`] is everything the pipeline needs from a browser. The real
//! implementation drives a WebDriver session ([`webdriver::WebDriverPage`]);
//! tests use the scripted [`mock::MockDriver`].
//!
//! One driver is created per run and used strictly sequentially. Best-effort
//! calls (`title`, `visible_text`, `screenshot`, `dismiss_cookie_consent`)
//! never fail; they return empty values instead.

pub mod webdriver;

#[cfg(test)]
pub mod mock;

use std::error::Error;
use std::time::Duration;

/// Button and link labels that accept a cookie banner.
pub const COOKIE_ACCEPT_LABELS: &[&str] = &[
    "accept",
    "agree",
    "ok",
    "j'accepte",
    "accepter",
    "tout accepter",
    "alle akzeptieren",
    "aceitar",
    "allow all",
];

/// True when a button/link text looks like a cookie-consent "accept".
pub fn is_accept_label(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    !text.is_empty() && COOKIE_ACCEPT_LABELS.iter().any(|label| text.contains(label))
}

/// Browser operations used by the search and article stages.
pub trait PageDriver {
    /// Load `url` in the current tab.
    async fn navigate(&mut self, url: &str) -> Result<(), Box<dyn Error>>;

    /// Wait until the document reports it is ready; error after `timeout`.
    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), Box<dyn Error>>;

    /// Markup of the current page.
    async fn current_html(&mut self) -> Result<String, Box<dyn Error>>;

    /// Document title, trimmed; `None` if empty or unavailable.
    async fn title(&mut self) -> Option<String>;

    /// Rendered body text; empty if unavailable.
    async fn visible_text(&mut self) -> String;

    /// Print the current page to PDF bytes.
    async fn print_to_pdf(&mut self) -> Result<Vec<u8>, Box<dyn Error>>;

    /// PNG screenshot of the viewport, if the browser supports it.
    async fn screenshot(&mut self) -> Option<Vec<u8>>;

    /// Click the first cookie-consent "accept" control, if any.
    async fn dismiss_cookie_consent(&mut self);

    /// End the session and release the browser.
    async fn quit(self) -> Result<(), Box<dyn Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_accept_label() {
        assert!(is_accept_label("  Tout accepter "));
        assert!(is_accept_label("Alle akzeptieren"));
        assert!(is_accept_label("OK"));
        assert!(!is_accept_label("Refuser"));
        assert!(!is_accept_label(""));
    }
}
