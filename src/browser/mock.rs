use super::PageDriver;
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::rc::Rc;
use std::time::Duration;

/// One scripted page.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub html: String,
    pub title: Option<String>,
    pub text: String,
    /// Make `wait_until_ready` time out on this page.
    pub never_ready: bool,
    /// Make `print_to_pdf` fail on this page.
    pub print_fails: bool,
}

impl MockPage {
    pub fn article(title: &str, text: &str) -> Self {
        Self {
            html: format!("<html><head><title>{title}</title></head><body><p>{text}</p></body></html>"),
            title: Some(title.to_string()),
            text: text.to_string(),
            ..Self::default()
        }
    }
}

/// Calls observed by a [`MockDriver`], shared so tests can inspect them after
/// the driver has been moved into a runner.
#[derive(Debug, Default)]
pub struct MockLog {
    pub navigations: Vec<String>,
    pub consent_dismissals: usize,
    pub quit: bool,
}

/// An in-memory [`PageDriver`] serving scripted pages by URL.
#[derive(Debug, Default)]
pub struct MockDriver {
    pages: HashMap<String, MockPage>,
    current: Option<String>,
    pub screenshots_supported: bool,
    pub log: Rc<RefCell<MockLog>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            screenshots_supported: true,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    fn page(&self) -> Result<&MockPage, Box<dyn Error>> {
        let url = self.current.as_deref().ok_or("no page loaded")?;
        self.pages
            .get(url)
            .ok_or_else(|| format!("net::ERR_NAME_NOT_RESOLVED at {url}").into())
    }
}

impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), Box<dyn Error>> {
        self.log.borrow_mut().navigations.push(url.to_string());
        self.current = Some(url.to_string());
        self.page().map(|_| ())
    }

    async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), Box<dyn Error>> {
        if self.page()?.never_ready {
            return Err(format!("page not ready after {timeout:?}").into());
        }
        Ok(())
    }

    async fn current_html(&mut self) -> Result<String, Box<dyn Error>> {
        Ok(self.page().map(|p| p.html.clone()).unwrap_or_default())
    }

    async fn title(&mut self) -> Option<String> {
        self.page().ok().and_then(|p| p.title.clone())
    }

    async fn visible_text(&mut self) -> String {
        self.page().map(|p| p.text.clone()).unwrap_or_default()
    }

    async fn print_to_pdf(&mut self) -> Result<Vec<u8>, Box<dyn Error>> {
        let page = self.page()?;
        if page.print_fails {
            return Err("printToPDF failed".into());
        }
        crate::outputs::pdf::render_lines(&[page.text.clone()])
    }

    async fn screenshot(&mut self) -> Option<Vec<u8>> {
        self.screenshots_supported.then(|| b"\x89PNG mock".to_vec())
    }

    async fn dismiss_cookie_consent(&mut self) {
        self.log.borrow_mut().consent_dismissals += 1;
    }

    async fn quit(self) -> Result<(), Box<dyn Error>> {
        self.log.borrow_mut().quit = true;
        Ok(())
    }
}
