//! Search collection: from keywords to one candidate per article URL.
//!
//! For each keyword a [`KeywordRound`] walks the result pages of one media
//! source:
//!
//! ```text
//! seed pages -> fetch -> parse -> filter by date -> keep unseen -> decide
//!                 ^                                                  |
//!                 +---------------- continue ------------------------+
//! ```
//!
//! A round stops when a page brings nothing new, when enough hits were
//! collected, or (for templates without `{page}`) when the page budget is
//! spent or no unvisited "next" link exists. The rounds of all keywords are
//! then folded into a [`CandidateSet`] keyed by URL.

use crate::fetch::PageSource;
use crate::media::{MediaSource, filter_hits_by_recency};
use crate::models::{CandidateHit, SearchHit};
use crate::utils::unique_preserve_order;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// Bounds applied to every keyword round.
#[derive(Debug, Clone)]
pub struct CollectLimits {
    pub max_pages: usize,
    pub max_results: usize,
    pub window_days: i64,
    pub delay: Duration,
}

/// Why a keyword round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoNewHits,
    MaxResults,
    MaxPages,
    NoNextPage,
    QueueExhausted,
}

enum Decision {
    Continue,
    Stop(StopReason),
}

/// Mutable state of one keyword round; dropped when the round ends.
#[derive(Debug, Default)]
struct KeywordRound {
    queue: VecDeque<String>,
    visited: HashSet<String>,
    seen_urls: HashSet<String>,
    hits: Vec<SearchHit>,
}

impl KeywordRound {
    fn seeded(urls: Vec<String>) -> Self {
        Self {
            queue: urls.into(),
            ..Self::default()
        }
    }

    fn next_unvisited(&mut self) -> Option<String> {
        while let Some(url) = self.queue.pop_front() {
            if self.visited.insert(url.clone()) {
                return Some(url);
            }
        }
        None
    }

    /// Append hits not seen earlier in this round; returns how many were new.
    fn absorb(&mut self, page_hits: Vec<SearchHit>) -> usize {
        let before = self.hits.len();
        for hit in page_hits {
            if self.seen_urls.insert(hit.url.clone()) {
                self.hits.push(hit);
            }
        }
        self.hits.len() - before
    }
}

/// Hits of every keyword for one media source, merged by URL.
///
/// Candidates keep the order in which their URL was first discovered.
#[derive(Debug, Default)]
pub struct CandidateSet {
    candidates: Vec<CandidateHit>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    /// Record that `keyword`'s search produced `hit`.
    pub fn absorb(&mut self, keyword: &str, hit: &SearchHit) {
        let slot = match self.index.get(&hit.url) {
            Some(&i) => i,
            None => {
                self.candidates.push(CandidateHit::new(hit.url.clone()));
                self.index.insert(hit.url.clone(), self.candidates.len() - 1);
                self.candidates.len() - 1
            }
        };
        self.candidates[slot].absorb(keyword, hit);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn into_candidates(self) -> Vec<CandidateHit> {
        self.candidates
            .into_iter()
            .map(|mut c| {
                c.snippets = unique_preserve_order(c.snippets);
                c
            })
            .collect()
    }
}

/// Runs keyword rounds against one media source.
#[derive(Debug)]
pub struct SearchCollector<'a> {
    media: &'a MediaSource,
    limits: CollectLimits,
    reference: DateTime<Utc>,
}

impl<'a> SearchCollector<'a> {
    /// `reference` is the instant the recency window is measured from.
    pub fn new(media: &'a MediaSource, limits: CollectLimits, reference: DateTime<Utc>) -> Self {
        Self {
            media,
            limits,
            reference,
        }
    }

    /// Search every keyword and merge the results by URL.
    ///
    /// # Arguments
    ///
    /// * `source` - Where result pages are fetched from (HTTP or the browser)
    /// * `keywords` - Keywords searched one after another, in order
    ///
    /// # Returns
    ///
    /// One candidate per distinct URL, carrying every keyword that found it.
    ///
    /// # Errors
    ///
    /// Fails on the first result page that cannot be fetched or parsed.
    #[instrument(level = "info", skip_all, fields(media = %self.media.media_id))]
    pub async fn collect<S: PageSource>(
        &self,
        source: &mut S,
        keywords: &[String],
    ) -> Result<CandidateSet, Box<dyn Error>> {
        let mut set = CandidateSet::default();
        for keyword in keywords {
            for hit in self.collect_keyword(source, keyword).await? {
                set.absorb(keyword, &hit);
            }
        }
        info!(candidates = set.len(), "Collected search candidates");
        Ok(set)
    }

    /// Walk the result pages for one keyword.
    #[instrument(level = "info", skip(self, source), fields(media = %self.media.media_id))]
    pub async fn collect_keyword<S: PageSource>(
        &self,
        source: &mut S,
        keyword: &str,
    ) -> Result<Vec<SearchHit>, Box<dyn Error>> {
        let mut round =
            KeywordRound::seeded(self.media.build_search_urls(keyword, self.limits.max_pages));

        let reason = loop {
            let Some(url) = round.next_unvisited() else {
                break StopReason::QueueExhausted;
            };
            let html = source.fetch_page(&url).await?;
            let page_hits = self.media.parse_results(&html, &url)?;
            let page_hits =
                filter_hits_by_recency(page_hits, self.limits.window_days, self.reference);
            let fresh = round.absorb(page_hits);
            debug!(%url, fresh, total = round.hits.len(), "Processed result page");

            match self.decide(&mut round, fresh, &html, &url) {
                Decision::Stop(reason) => break reason,
                Decision::Continue => sleep(self.limits.delay).await,
            }
        };

        info!(
            keyword,
            hits = round.hits.len(),
            pages = round.visited.len(),
            ?reason,
            "Keyword round finished"
        );
        Ok(round.hits)
    }

    fn decide(&self, round: &mut KeywordRound, fresh: usize, html: &str, url: &str) -> Decision {
        if fresh == 0 {
            return Decision::Stop(StopReason::NoNewHits);
        }
        if round.hits.len() >= self.limits.max_results {
            return Decision::Stop(StopReason::MaxResults);
        }
        if !self.media.has_page_placeholder() {
            if round.visited.len() >= self.limits.max_pages {
                return Decision::Stop(StopReason::MaxPages);
            }
            match self.media.detect_next_page(html, url) {
                Some(next) if !round.visited.contains(&next) => round.queue.push_back(next),
                _ => return Decision::Stop(StopReason::NoNextPage),
            }
        }
        if round.queue.is_empty() {
            return Decision::Stop(StopReason::QueueExhausted);
        }
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockSource;
    use crate::media::registry;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap()
    }

    fn limits(max_pages: usize, max_results: usize) -> CollectLimits {
        CollectLimits {
            max_pages,
            max_results,
            window_days: 2,
            delay: Duration::ZERO,
        }
    }

    fn listing(links: &[&str], next: Option<&str>) -> String {
        let mut html = String::from("<html><body>");
        for link in links {
            html.push_str(&format!(r#"<div><a href="{link}">{link}</a></div>"#));
        }
        if let Some(next) = next {
            html.push_str(&format!(r#"<a href="{next}">Suivant</a>"#));
        }
        html.push_str("</body></html>");
        html
    }

    fn wordpress_source() -> MediaSource {
        MediaSource {
            media_id: "tageblatt.lu".to_string(),
            search_url: "https://tageblatt.lu/?s={query}".to_string(),
            domain: "tageblatt.lu".to_string(),
            search_result_selectors: vec!["div > a".to_string()],
            exclude_url_substrings: registry::default_excludes(),
        }
    }

    #[tokio::test]
    async fn test_placeholder_pages_stop_when_nothing_new() {
        let rtl = registry::lookup("rtl.lu").unwrap();
        let mut source = MockSource::default()
            .with_page(
                "https://rtl.lu/search?q=BGL&p=1",
                &listing(&["/news/a", "/news/b"], None),
            )
            .with_page(
                "https://rtl.lu/search?q=BGL&p=2",
                &listing(&["/news/b", "/news/a"], None),
            )
            .with_page("https://rtl.lu/search?q=BGL&p=3", &listing(&["/news/c"], None));

        let collector = SearchCollector::new(&rtl, limits(3, 200), reference());
        let hits = collector.collect_keyword(&mut source, "BGL").await.unwrap();

        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://rtl.lu/news/a", "https://rtl.lu/news/b"]);
        assert_eq!(source.requests.len(), 2);
    }

    #[tokio::test]
    async fn test_max_results_stops_round() {
        let rtl = registry::lookup("rtl.lu").unwrap();
        let mut source = MockSource::default()
            .with_page(
                "https://rtl.lu/search?q=BGL&p=1",
                &listing(&["/news/a", "/news/b", "/news/c"], None),
            )
            .with_page("https://rtl.lu/search?q=BGL&p=2", &listing(&["/news/d"], None));

        let collector = SearchCollector::new(&rtl, limits(5, 2), reference());
        let hits = collector.collect_keyword(&mut source, "BGL").await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(source.requests.len(), 1);
    }

    #[tokio::test]
    async fn test_next_link_pagination_respects_page_budget() {
        let media = wordpress_source();
        let mut source = MockSource::default()
            .with_page(
                "https://tageblatt.lu/?s=CSSF",
                &listing(&["/a1"], Some("/page/2/?s=CSSF")),
            )
            .with_page(
                "https://tageblatt.lu/page/2/?s=CSSF",
                &listing(&["/a2"], Some("/page/3/?s=CSSF")),
            )
            .with_page(
                "https://tageblatt.lu/page/3/?s=CSSF",
                &listing(&["/a3"], Some("/page/4/?s=CSSF")),
            );

        let collector = SearchCollector::new(&media, limits(2, 200), reference());
        let hits = collector.collect_keyword(&mut source, "CSSF").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(
            source.requests,
            vec!["https://tageblatt.lu/?s=CSSF", "https://tageblatt.lu/page/2/?s=CSSF"]
        );
    }

    #[tokio::test]
    async fn test_next_link_pointing_back_stops() {
        let media = wordpress_source();
        let mut source = MockSource::default().with_page(
            "https://tageblatt.lu/?s=CSSF",
            &listing(&["/a1"], Some("/?s=CSSF")),
        );
        let collector = SearchCollector::new(&media, limits(10, 200), reference());
        let hits = collector.collect_keyword(&mut source, "CSSF").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(source.requests.len(), 1);
    }

    #[tokio::test]
    async fn test_round_terminates_on_endless_next_links() {
        let media = wordpress_source();
        let max_pages = 4;
        let mut source = MockSource::default();
        for page in 1..=20 {
            let url = if page == 1 {
                "https://tageblatt.lu/?s=x".to_string()
            } else {
                format!("https://tageblatt.lu/page/{page}/?s=x")
            };
            let next = format!("/page/{}/?s=x", page + 1);
            let link = format!("/article-{page}");
            source = source.with_page(&url, &listing(&[&link], Some(&next)));
        }
        let collector = SearchCollector::new(&media, limits(max_pages, 1000), reference());
        collector.collect_keyword(&mut source, "x").await.unwrap();
        assert!(source.requests.len() <= max_pages + 1);
    }

    #[tokio::test]
    async fn test_stale_hits_are_dropped_but_undated_kept() {
        let rtl = registry::lookup("rtl.lu").unwrap();
        let html = r#"
            <div><a href="/news/old">Old</a><time datetime="2024-01-01T00:00:00Z"></time></div>
            <div><a href="/news/new">New</a><time datetime="2024-03-12T08:00:00Z"></time></div>
            <div><a href="/news/undated">Undated</a></div>
        "#;
        let mut source = MockSource::default().with_page("https://rtl.lu/search?q=k&p=1", html);
        let collector = SearchCollector::new(&rtl, limits(1, 200), reference());
        let hits = collector.collect_keyword(&mut source, "k").await.unwrap();
        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://rtl.lu/news/new", "https://rtl.lu/news/undated"]);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let rtl = registry::lookup("rtl.lu").unwrap();
        let mut source = MockSource::default();
        source.failures_before_success = 1;
        let collector = SearchCollector::new(&rtl, limits(1, 200), reference());
        assert!(collector.collect(&mut source, &["k".to_string()]).await.is_err());
    }

    async fn merged_keywords(order: &[&str]) -> Vec<(String, Vec<String>)> {
        let rtl = registry::lookup("rtl.lu").unwrap();
        let mut source = MockSource::default()
            .with_page(
                "https://rtl.lu/search?q=BGL&p=1",
                &listing(&["/news/shared", "/news/bgl-only"], None),
            )
            .with_page(
                "https://rtl.lu/search?q=CSSF&p=1",
                &listing(&["/news/cssf-only", "/news/shared"], None),
            );
        let keywords: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        let collector = SearchCollector::new(&rtl, limits(1, 200), reference());
        let set = collector.collect(&mut source, &keywords).await.unwrap();
        let mut out: Vec<_> = set
            .into_candidates()
            .into_iter()
            .map(|c| (c.url, c.keywords.into_iter().collect::<Vec<_>>()))
            .collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_merge_is_commutative_in_keyword_order() {
        let forward = merged_keywords(&["BGL", "CSSF"]).await;
        let backward = merged_keywords(&["CSSF", "BGL"]).await;
        assert_eq!(forward, backward);
        let shared = forward
            .iter()
            .find(|(url, _)| url.ends_with("/news/shared"))
            .unwrap();
        assert_eq!(shared.1, vec!["BGL", "CSSF"]);
    }

    #[test]
    fn test_candidate_set_merge_is_idempotent() {
        let hit = SearchHit {
            url: "https://rtl.lu/a".to_string(),
            title: Some("A".to_string()),
            published_at: None,
            snippet: Some("s".to_string()),
            media_id: "rtl.lu".to_string(),
        };
        let mut set = CandidateSet::default();
        set.absorb("BGL", &hit);
        set.absorb("BGL", &hit);
        let candidates = set.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].snippets, vec!["s"]);
        assert_eq!(candidates[0].keywords.len(), 1);
    }
}
