//! Article processing: one candidate URL in, one [`ArticleRecord`] out.
//!
//! ```text
//! navigate -> wait ready -> dismiss consent -> title/date -> visible text
//!     -> keyword match? -- no --> skipped
//!                       -- yes -> print PDF --> ok
//! any error along the way -----------------------> failed (+ diagnostics)
//! ```
//!
//! Errors never escape [`ArticleProcessor::process`]; they become a `failed`
//! record whose `errors` start with the originating message and continue
//! with the paths of whatever diagnostics could be written.

use crate::browser::PageDriver;
use crate::dates::{parse_date, to_iso_utc};
use crate::media::element_text;
use crate::models::{ArticleDraft, ArticleRecord, CandidateHit};
use crate::text::matched_keywords;
use crate::utils::{pause, safe_filename, truncate_for_log};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Meta keys carrying a publish date, most specific first.
const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "og:pubdate",
    "pubdate",
    "date",
    "publish_date",
    "dc.date",
];

const SNIPPET_FALLBACK_CHARS: usize = 200;
const PDF_STEM_MAX_LEN: usize = 120;

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").expect("static selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("static selector"));

/// Publish date declared by an article page.
///
/// Meta tags are tried in [`DATE_META_KEYS`] order (matching either the
/// `property` or the `name` attribute), then the first `<time>` element.
/// Values that do not parse are passed over.
pub fn extract_publish_date(html: &str) -> Option<DateTime<Utc>> {
    let doc = Html::parse_document(html);
    let metas: Vec<_> = doc.select(&META).collect();

    let from_meta = DATE_META_KEYS.iter().find_map(|key| {
        ["property", "name"].iter().find_map(|attr| {
            metas
                .iter()
                .find(|m| m.value().attr(attr) == Some(*key))
                .and_then(|m| m.value().attr("content"))
                .and_then(parse_date)
        })
    });
    if from_meta.is_some() {
        return from_meta;
    }

    let time = doc.select(&TIME).next()?;
    match time.value().attr("datetime").filter(|v| !v.trim().is_empty()) {
        Some(value) => parse_date(value),
        None => parse_date(&element_text(time)),
    }
}

enum Outcome {
    Matched(Vec<String>, PathBuf),
    NoMatch,
}

/// Turns candidates into records for one run.
#[derive(Debug, Clone)]
pub struct ArticleProcessor {
    pub run_id: String,
    pub run_timestamp: String,
    pub keywords: Vec<String>,
    pub wait_timeout: Duration,
    /// `<run_dir>/pdfs`
    pub pdf_dir: PathBuf,
    /// `<output_dir>/errors/<run_id>`
    pub error_dir: PathBuf,
    pub pause_after_load: bool,
    pub pause_on_error: bool,
}

impl ArticleProcessor {
    /// Load one candidate in the browser and classify it.
    ///
    /// # Arguments
    ///
    /// * `driver` - Browser session the article is loaded in
    /// * `media_id` - Media the candidate was found on
    /// * `candidate` - The merged search hit to inspect
    ///
    /// # Returns
    ///
    /// An `ok` record with its PDF when a keyword occurs in the page text,
    /// `skipped` when none does, and `failed` when loading, reading or
    /// printing the page went wrong. Failures also leave an HTML snapshot and
    /// a screenshot under the run's error directory.
    #[instrument(level = "info", skip_all, fields(media = %media_id, url = %candidate.url))]
    pub async fn process<D: PageDriver>(
        &self,
        driver: &mut D,
        media_id: &str,
        candidate: &CandidateHit,
    ) -> ArticleRecord {
        let mut draft = ArticleDraft {
            run_id: self.run_id.clone(),
            run_timestamp: self.run_timestamp.clone(),
            media: media_id.to_string(),
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            published_at: candidate.published_at.map(to_iso_utc),
            snippets: candidate.snippets.clone(),
        };

        match self.inspect(driver, media_id, &mut draft).await {
            Ok(Outcome::Matched(keywords, pdf_path)) => {
                info!(keywords = ?keywords, pdf = %pdf_path.display(), "Article matched");
                draft.ok(keywords, pdf_path)
            }
            Ok(Outcome::NoMatch) => {
                debug!("No keyword in article text");
                draft.skipped()
            }
            Err(e) => {
                warn!(error = %truncate_for_log(&e.to_string(), 300), "Article processing failed");
                if self.pause_on_error {
                    pause("Error encountered. Press Enter to continue...").await;
                }
                let mut errors = vec![e.to_string()];
                errors.extend(self.capture_diagnostics(driver, media_id, &candidate.url).await);
                draft.failed(errors, None)
            }
        }
    }

    async fn inspect<D: PageDriver>(
        &self,
        driver: &mut D,
        media_id: &str,
        draft: &mut ArticleDraft,
    ) -> Result<Outcome, Box<dyn Error>> {
        driver.navigate(&draft.url).await?;
        driver.wait_until_ready(self.wait_timeout).await?;
        driver.dismiss_cookie_consent().await;

        if let Some(title) = driver.title().await {
            draft.title = Some(title);
        }
        let html = driver.current_html().await?;
        if let Some(published) = extract_publish_date(&html) {
            draft.published_at = Some(to_iso_utc(published));
        }

        if self.pause_after_load {
            pause("Article page loaded. Press Enter to continue...").await;
        }

        let text = driver.visible_text().await;
        if draft.snippets.is_empty() {
            let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                draft
                    .snippets
                    .push(collapsed.chars().take(SNIPPET_FALLBACK_CHARS).collect());
            }
        }

        let matched = matched_keywords(&self.keywords, &text);
        if matched.is_empty() {
            return Ok(Outcome::NoMatch);
        }

        let stem = safe_filename(draft.title.as_deref().unwrap_or(&draft.url), PDF_STEM_MAX_LEN);
        let pdf_path = self.pdf_dir.join(format!("{media_id}_{stem}.pdf"));
        let bytes = driver.print_to_pdf().await?;
        fs::write(&pdf_path, bytes).await?;
        Ok(Outcome::Matched(matched, pdf_path))
    }

    /// Error entries describing the diagnostics written for a failed article.
    ///
    /// Never fails: a capture problem is itself reported as one entry.
    async fn capture_diagnostics<D: PageDriver>(
        &self,
        driver: &mut D,
        media_id: &str,
        url: &str,
    ) -> Vec<String> {
        let dir = self.error_dir.join(media_id);
        match write_diagnostics(driver, &dir, url).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Could not write diagnostics");
                vec![format!("Artifact capture failed: {e}")]
            }
        }
    }
}

async fn write_diagnostics<D: PageDriver>(
    driver: &mut D,
    dir: &Path,
    url: &str,
) -> Result<Vec<String>, Box<dyn Error>> {
    fs::create_dir_all(dir).await?;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");

    let html_path = dir.join(format!("{stamp}_page.html"));
    let html = driver.current_html().await.unwrap_or_default();
    fs::write(&html_path, html).await?;

    let mut entries = vec![format!("URL: {url}")];
    if let Some(png) = driver.screenshot().await {
        let png_path = dir.join(format!("{stamp}_page.png"));
        match fs::write(&png_path, png).await {
            Ok(()) => entries.push(format!("Screenshot: {}", png_path.display())),
            Err(e) => debug!(error = %e, "Screenshot not saved"),
        }
    }
    entries.push(format!("HTML: {}", html_path.display()));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockDriver, MockPage};
    use crate::models::{ArticleStatus, NO_MATCH_MESSAGE};
    use chrono::TimeZone;

    const URL: &str = "https://www.rtl.lu/news/national/a/123";

    fn processor(root: &Path) -> ArticleProcessor {
        let pdf_dir = root.join("run_x").join("pdfs");
        std::fs::create_dir_all(&pdf_dir).unwrap();
        ArticleProcessor {
            run_id: "run_x".to_string(),
            run_timestamp: "2024-03-12T12:00:00Z".to_string(),
            keywords: vec!["BGL".to_string(), "Place Financière".to_string()],
            wait_timeout: Duration::from_millis(10),
            pdf_dir,
            error_dir: root.join("errors").join("run_x"),
            pause_after_load: false,
            pause_on_error: false,
        }
    }

    fn candidate() -> CandidateHit {
        let mut c = CandidateHit::new(URL);
        c.title = Some("Search title".to_string());
        c
    }

    #[tokio::test]
    async fn test_matching_article_is_printed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new().with_page(
            URL,
            MockPage::article("Résultats de BGL", "La place financiere et BGL BNP Paribas."),
        );
        let record = processor(tmp.path())
            .process(&mut driver, "rtl.lu", &candidate())
            .await;

        assert_eq!(record.status, ArticleStatus::Ok);
        assert_eq!(record.matched_keywords, vec!["BGL", "Place Financière"]);
        assert_eq!(record.title.as_deref(), Some("Résultats de BGL"));
        let pdf = PathBuf::from(record.per_article_pdf_path.unwrap());
        assert!(pdf.ends_with("rtl.lu_resultats-de-bgl.pdf"));
        assert!(pdf.exists());
        assert!(record.errors.is_empty());
        assert_eq!(record.snippets.len(), 1);
        assert!(record.date_unknown);
    }

    #[tokio::test]
    async fn test_article_without_keyword_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver =
            MockDriver::new().with_page(URL, MockPage::article("Weather", "Sunny all week."));
        let record = processor(tmp.path())
            .process(&mut driver, "rtl.lu", &candidate())
            .await;

        assert_eq!(record.status, ArticleStatus::Skipped);
        assert!(record.matched_keywords.is_empty());
        assert_eq!(record.errors, vec![NO_MATCH_MESSAGE]);
        assert!(record.per_article_pdf_path.is_none());
        assert_eq!(record.snippets, vec!["Sunny all week."]);
    }

    #[tokio::test]
    async fn test_readiness_timeout_fails_with_diagnostics() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new().with_page(
            URL,
            MockPage {
                never_ready: true,
                ..MockPage::article("Slow", "BGL")
            },
        );
        let record = processor(tmp.path())
            .process(&mut driver, "rtl.lu", &candidate())
            .await;

        assert_eq!(record.status, ArticleStatus::Failed);
        assert!(record.errors[0].contains("not ready"));
        assert_eq!(record.errors[1], format!("URL: {URL}"));
        assert!(record.errors.iter().any(|e| e.starts_with("Screenshot: ")));
        assert!(record.errors.last().unwrap().starts_with("HTML: "));
        assert_eq!(record.title.as_deref(), Some("Search title"));

        let html_path = record.errors.last().unwrap().trim_start_matches("HTML: ");
        assert!(Path::new(html_path).starts_with(tmp.path().join("errors/run_x/rtl.lu")));
        assert!(Path::new(html_path).exists());
    }

    #[tokio::test]
    async fn test_missing_screenshot_is_omitted_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new().with_page(
            URL,
            MockPage {
                print_fails: true,
                ..MockPage::article("Print", "BGL results")
            },
        );
        driver.screenshots_supported = false;
        let record = processor(tmp.path())
            .process(&mut driver, "rtl.lu", &candidate())
            .await;

        assert_eq!(record.status, ArticleStatus::Failed);
        assert_eq!(record.errors[0], "printToPDF failed");
        assert!(!record.errors.iter().any(|e| e.starts_with("Screenshot: ")));
        assert!(record.matched_keywords.is_empty());
        assert!(record.per_article_pdf_path.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_url_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new();
        let record = processor(tmp.path())
            .process(&mut driver, "rtl.lu", &candidate())
            .await;
        assert_eq!(record.status, ArticleStatus::Failed);
        assert!(record.errors[0].contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[tokio::test]
    async fn test_page_date_wins_over_search_date() {
        let tmp = tempfile::tempdir().unwrap();
        let html = r#"<html><head>
            <meta property="article:published_time" content="2024-03-11T08:30:00+01:00">
            </head><body>BGL</body></html>"#;
        let mut driver = MockDriver::new().with_page(
            URL,
            MockPage {
                html: html.to_string(),
                text: "BGL".to_string(),
                ..MockPage::default()
            },
        );
        let mut hit = candidate();
        hit.published_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let record = processor(tmp.path()).process(&mut driver, "rtl.lu", &hit).await;

        assert_eq!(record.published_at.as_deref(), Some("2024-03-11T07:30:00Z"));
        assert!(!record.date_unknown);
        assert_eq!(record.title.as_deref(), Some("Search title"));
    }

    #[tokio::test]
    async fn test_search_date_used_when_page_has_none() {
        let tmp = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new().with_page(URL, MockPage::article("T", "nothing"));
        let mut hit = candidate();
        hit.published_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap());
        let record = processor(tmp.path()).process(&mut driver, "rtl.lu", &hit).await;
        assert_eq!(record.published_at.as_deref(), Some("2024-03-10T06:00:00Z"));
        assert!(!record.date_unknown);
    }

    #[test]
    fn test_extract_publish_date_sources() {
        let by_name = r#"<meta name="date" content="12.03.2024 10:15">"#;
        assert_eq!(
            extract_publish_date(by_name),
            Some(Utc.with_ymd_and_hms(2024, 3, 12, 10, 15, 0).unwrap())
        );

        let unparseable_meta = r#"<meta name="pubdate" content="soon">
            <time datetime="2024-03-09T00:00:00Z">9 mars</time>"#;
        assert_eq!(
            extract_publish_date(unparseable_meta),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap())
        );

        let time_text = "<p>Publié le <time>12 mars 2024</time></p>";
        assert_eq!(
            extract_publish_date(time_text).map(|d| d.date_naive().to_string()),
            Some("2024-03-12".to_string())
        );

        assert_eq!(extract_publish_date("<p>no date</p>"), None);
    }
}
