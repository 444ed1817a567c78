//! Media sources: where to search and how to read the result pages.
//!
//! Every site goes through the same code path. A [`MediaSource`] is plain
//! configuration (search URL template, allowed domain, excluded URL
//! substrings, optional result selectors) and the methods here interpret it:
//!
//! 1. [`MediaSource::build_search_urls`] expands the template for a keyword
//! 2. [`MediaSource::parse_results`] turns result-page markup into [`SearchHit`]s
//! 3. [`MediaSource::detect_next_page`] finds the "next" link for templates
//!    without a `{page}` placeholder
//!
//! Fetching the markup is somebody else's job; see [`crate::fetch`].

pub mod registry;

use crate::dates::{is_recent, parse_date};
use crate::models::SearchHit;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::error::Error;
use tracing::{debug, instrument};
use url::Url;
use url::form_urlencoded::byte_serialize;

const QUERY_PLACEHOLDER: &str = "{query}";
const PAGE_PLACEHOLDER: &str = "{page}";

/// Anchor labels that mean "next page" on English, French, German and
/// Portuguese sites.
const NEXT_LABELS: &[&str] = &[
    "next",
    "next page",
    "suivant",
    "suivante",
    "page suivante",
    "weiter",
    "nächste",
    "nächste seite",
    "seguinte",
    "próxima",
    "proxima",
];

static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static REL_NEXT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[rel~="next"][href], link[rel~="next"][href]"#).expect("static selector")
});
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("static selector"));
static DATE_CLASS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="date"]"#).expect("static selector"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));

/// Configuration for one searchable news site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Identifier used on the command line and in outputs (e.g. `rtl.lu`).
    pub media_id: String,
    /// Search URL with a `{query}` and optionally a `{page}` placeholder.
    pub search_url: String,
    /// Result links must have a host containing this string.
    pub domain: String,
    /// CSS selectors for result links; empty means every `a[href]`.
    #[serde(default)]
    pub search_result_selectors: Vec<String>,
    /// Result links containing any of these substrings are dropped.
    #[serde(default = "registry::default_excludes")]
    pub exclude_url_substrings: Vec<String>,
}

impl MediaSource {
    /// Whether the template paginates through a `{page}` placeholder.
    pub fn has_page_placeholder(&self) -> bool {
        self.search_url.contains(PAGE_PLACEHOLDER)
    }

    /// Search URLs for `keyword`, in fetch order.
    ///
    /// With a `{page}` placeholder this yields pages `1..=max_pages`;
    /// otherwise a single URL, and further pages are discovered with
    /// [`detect_next_page`](Self::detect_next_page).
    pub fn build_search_urls(&self, keyword: &str, max_pages: usize) -> Vec<String> {
        let query: String = byte_serialize(keyword.as_bytes()).collect();
        let base = self.search_url.replace(QUERY_PLACEHOLDER, &query);
        if self.has_page_placeholder() {
            (1..=max_pages.max(1))
                .map(|page| base.replace(PAGE_PLACEHOLDER, &page.to_string()))
                .collect()
        } else {
            vec![base]
        }
    }

    /// Extract article hits from a search result page.
    ///
    /// Links are resolved against `base_url` and kept only when their host
    /// contains [`domain`](Self::domain) and they contain none of the excluded
    /// substrings. Title, date and snippet are read from the link and its
    /// immediate parent.
    #[instrument(level = "debug", skip_all, fields(media = %self.media_id, %base_url))]
    pub fn parse_results(&self, html: &str, base_url: &str) -> Result<Vec<SearchHit>, Box<dyn Error>> {
        let base = Url::parse(base_url)?;
        let document = Html::parse_document(html);

        let custom = self
            .search_result_selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|e| format!("invalid selector {s:?}: {e:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        let elements: Vec<ElementRef<'_>> = if custom.is_empty() {
            document.select(&ANY_LINK).collect()
        } else {
            custom.iter().flat_map(|sel| document.select(sel)).collect()
        };

        let mut hits = Vec::new();
        for element in elements {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if !self.is_allowed_url(&resolved) {
                continue;
            }
            let published_at = date_text_near(element).and_then(|t| parse_date(&t));
            hits.push(SearchHit {
                url: resolved.to_string(),
                title: non_empty(element_text(element)),
                published_at,
                snippet: snippet_near(element),
                media_id: self.media_id.clone(),
            });
        }
        debug!(count = hits.len(), "Parsed search results");
        Ok(hits)
    }

    /// The "next page" link of a result page, resolved against `base_url`.
    ///
    /// A `rel="next"` link wins; otherwise the first anchor whose whole text is
    /// one of the known "next" labels.
    pub fn detect_next_page(&self, html: &str, base_url: &str) -> Option<String> {
        let base = Url::parse(base_url).ok()?;
        let document = Html::parse_document(html);

        if let Some(href) = document
            .select(&REL_NEXT)
            .find_map(|el| el.value().attr("href"))
        {
            return base.join(href).ok().map(String::from);
        }

        document.select(&ANY_LINK).find_map(|el| {
            let label = element_text(el).to_lowercase();
            if NEXT_LABELS.contains(&label.as_str()) {
                el.value()
                    .attr("href")
                    .and_then(|href| base.join(href).ok())
                    .map(String::from)
            } else {
                None
            }
        })
    }

    fn is_allowed_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !host.contains(&self.domain) {
            return false;
        }
        let as_str = url.as_str();
        !self
            .exclude_url_substrings
            .iter()
            .any(|bad| as_str.contains(bad.as_str()))
    }
}

/// Keep hits published inside the window; hits without a date always pass.
pub fn filter_hits_by_recency(
    hits: Vec<SearchHit>,
    window_days: i64,
    reference: DateTime<Utc>,
) -> Vec<SearchHit> {
    hits.into_iter()
        .filter(|hit| match hit.published_at {
            None => true,
            Some(ts) => is_recent(ts, window_days, reference),
        })
        .collect()
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn time_value(time: ElementRef<'_>) -> Option<String> {
    time.value()
        .attr("datetime")
        .map(str::to_string)
        .or_else(|| non_empty(element_text(time)))
}

fn date_text_near(element: ElementRef<'_>) -> Option<String> {
    if let Some(text) = element.select(&TIME).next().and_then(time_value) {
        return Some(text);
    }
    let parent = element.parent().and_then(ElementRef::wrap)?;
    if let Some(time) = parent.select(&TIME).next() {
        return time_value(time);
    }
    parent
        .select(&DATE_CLASS)
        .next()
        .and_then(|el| non_empty(element_text(el)))
}

fn snippet_near(element: ElementRef<'_>) -> Option<String> {
    let parent = element.parent().and_then(ElementRef::wrap)?;
    parent
        .select(&PARAGRAPH)
        .next()
        .and_then(|p| non_empty(element_text(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const RESULTS_FIXTURE: &str = r#"
        <html><body>
          <header><a href="/search?q=BNP&p=2">Search again</a></header>
          <ul class="results">
            <li>
              <article>
                <a href="/news/article-1">BNP Paribas annonce ses résultats</a>
                <time datetime="2024-03-11T09:00:00+01:00">11 mars</time>
                <p>La banque publie ses chiffres annuels.</p>
              </article>
            </li>
            <li>
              <div>
                <a href="https://rtl.lu/news/article-2">Arval
                  recrute</a>
                <span class="post-date">12.03.2024</span>
              </div>
            </li>
            <li><a href="https://example.com/news/elsewhere">Off-site</a></li>
            <li><a href="https://rtl.lu/recherche?q=BNP">Recherche</a></li>
          </ul>
          <nav><a rel="next" href="?q=BNP&p=2">2</a></nav>
        </body></html>
    "#;

    fn rtl() -> MediaSource {
        registry::lookup("rtl.lu").unwrap()
    }

    fn paperless(template: &str) -> MediaSource {
        MediaSource {
            media_id: "example.lu".to_string(),
            search_url: template.to_string(),
            domain: "example.lu".to_string(),
            search_result_selectors: vec![],
            exclude_url_substrings: registry::default_excludes(),
        }
    }

    #[test]
    fn test_build_search_urls_with_page_placeholder() {
        let urls = rtl().build_search_urls("BNP PARIBAS", 3);
        assert_eq!(
            urls,
            vec![
                "https://rtl.lu/search?q=BNP+PARIBAS&p=1",
                "https://rtl.lu/search?q=BNP+PARIBAS&p=2",
                "https://rtl.lu/search?q=BNP+PARIBAS&p=3",
            ]
        );
    }

    #[test]
    fn test_build_search_urls_without_page_placeholder() {
        let source = paperless("https://example.lu/?s={query}");
        assert_eq!(
            source.build_search_urls("place financière", 5),
            vec!["https://example.lu/?s=place+financi%C3%A8re"]
        );
    }

    #[test]
    fn test_parse_results_fixture_keeps_both_articles() {
        let hits = rtl()
            .parse_results(RESULTS_FIXTURE, "https://rtl.lu/search?q=BNP")
            .unwrap();
        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://rtl.lu/news/article-1", "https://rtl.lu/news/article-2"]
        );

        let first = &hits[0];
        assert_eq!(first.title.as_deref(), Some("BNP Paribas annonce ses résultats"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 8, 0, 0).unwrap())
        );
        assert_eq!(first.snippet.as_deref(), Some("La banque publie ses chiffres annuels."));

        let second = &hits[1];
        assert_eq!(second.title.as_deref(), Some("Arval recrute"));
        assert_eq!(
            second.published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap())
        );
        assert_eq!(second.snippet, None);
    }

    #[test]
    fn test_parse_then_filter_within_window_yields_both() {
        let reference = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        let hits = rtl()
            .parse_results(RESULTS_FIXTURE, "https://rtl.lu/search?q=BNP")
            .unwrap();
        let kept = filter_hits_by_recency(hits, 2, reference);
        let urls: Vec<_> = kept.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://rtl.lu/news/article-1", "https://rtl.lu/news/article-2"]
        );
    }

    #[test]
    fn test_filter_keeps_undated_hits() {
        let reference = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        let undated = SearchHit {
            url: "https://rtl.lu/a".to_string(),
            title: None,
            published_at: None,
            snippet: None,
            media_id: "rtl.lu".to_string(),
        };
        let stale = SearchHit {
            url: "https://rtl.lu/b".to_string(),
            published_at: Some(reference - Duration::days(30)),
            ..undated.clone()
        };
        let kept = filter_hits_by_recency(vec![undated.clone(), stale], 2, reference);
        assert_eq!(kept, vec![undated]);
    }

    #[test]
    fn test_custom_selectors_narrow_discovery() {
        let mut source = rtl();
        source.search_result_selectors = vec!["div > a".to_string()];
        let hits = source
            .parse_results(RESULTS_FIXTURE, "https://rtl.lu/search?q=BNP")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://rtl.lu/news/article-2");
    }

    #[test]
    fn test_invalid_custom_selector_is_an_error() {
        let mut source = rtl();
        source.search_result_selectors = vec!["a[".to_string()];
        assert!(source.parse_results("<a href='/x'>x</a>", "https://rtl.lu/").is_err());
    }

    #[test]
    fn test_detect_next_page_prefers_rel_next() {
        let next = rtl().detect_next_page(RESULTS_FIXTURE, "https://rtl.lu/search?q=BNP");
        assert_eq!(next.as_deref(), Some("https://rtl.lu/search?q=BNP&p=2"));
    }

    #[test]
    fn test_detect_next_page_by_label() {
        let html = r#"<a href="/page/1">1</a> <a href="/page/2/?s=bgl"> Suivant </a>"#;
        let next = paperless("https://example.lu/page/1/?s={query}")
            .detect_next_page(html, "https://example.lu/page/1/?s=bgl");
        assert_eq!(next.as_deref(), Some("https://example.lu/page/2/?s=bgl"));
    }

    #[test]
    fn test_detect_next_page_none() {
        let html = r#"<a href="/page/1">1</a>"#;
        assert_eq!(rtl().detect_next_page(html, "https://rtl.lu/"), None);
    }
}
