//! Data models for search hits, per-article outcomes and per-run aggregates.
//!
//! - [`SearchHit`]: one link found on a search result page
//! - [`CandidateHit`]: every hit for one URL merged across keywords
//! - [`ArticleRecord`]: the final outcome for one article in one run
//! - [`MediaSourceStatus`]: how one media source fared during the run
//! - [`RunResult`]: everything a run produced
//!
//! [`ArticleRecord`] and the status enums serialize with the field names used
//! in `matches.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// A single article link discovered on a search result page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Absolute article URL.
    pub url: String,
    /// Link text, if any.
    pub title: Option<String>,
    /// Publish date found next to the link.
    pub published_at: Option<DateTime<Utc>>,
    /// Short teaser text found next to the link.
    pub snippet: Option<String>,
    /// Media source the hit came from.
    pub media_id: String,
}

/// All hits sharing one URL within one media source, merged across keywords.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateHit {
    pub url: String,
    /// Every search keyword whose results contained this URL.
    pub keywords: BTreeSet<String>,
    /// Snippets in first-seen order, without duplicates.
    pub snippets: Vec<String>,
    /// First non-empty title seen.
    pub title: Option<String>,
    /// First publish date seen.
    pub published_at: Option<DateTime<Utc>>,
}

impl CandidateHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keywords: BTreeSet::new(),
            snippets: Vec::new(),
            title: None,
            published_at: None,
        }
    }

    /// Fold one more hit for this URL into the candidate.
    ///
    /// Absorbing the same `(keyword, hit)` twice leaves the candidate unchanged.
    pub fn absorb(&mut self, keyword: &str, hit: &SearchHit) {
        self.keywords.insert(keyword.to_string());
        if let Some(snippet) = hit.snippet.as_ref().filter(|s| !s.is_empty()) {
            if !self.snippets.contains(snippet) {
                self.snippets.push(snippet.clone());
            }
        }
        if self.title.is_none() {
            self.title = hit.title.clone().filter(|t| !t.is_empty());
        }
        if self.published_at.is_none() {
            self.published_at = hit.published_at;
        }
    }
}

/// Final disposition of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// At least one keyword matched and the PDF was written.
    Ok,
    /// The page loaded but no keyword matched.
    Skipped,
    /// Navigation, extraction or printing failed.
    Failed,
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArticleStatus::Ok => "ok",
            ArticleStatus::Skipped => "skipped",
            ArticleStatus::Failed => "failed",
        })
    }
}

/// Error message recorded on every skipped article.
pub const NO_MATCH_MESSAGE: &str = "No keyword match found in visible text.";

/// What was learned about an article before it was classified.
#[derive(Debug, Clone, Default)]
pub struct ArticleDraft {
    pub run_id: String,
    pub run_timestamp: String,
    pub media: String,
    pub url: String,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub snippets: Vec<String>,
}

impl ArticleDraft {
    /// `status = ok`: requires at least one keyword and the written PDF.
    pub fn ok(self, matched_keywords: Vec<String>, pdf_path: PathBuf) -> ArticleRecord {
        debug_assert!(!matched_keywords.is_empty());
        self.into_record(ArticleStatus::Ok, matched_keywords, Some(pdf_path), Vec::new())
    }

    /// `status = skipped`: no keywords, no PDF, exactly one explanation.
    pub fn skipped(self) -> ArticleRecord {
        self.into_record(
            ArticleStatus::Skipped,
            Vec::new(),
            None,
            vec![NO_MATCH_MESSAGE.to_string()],
        )
    }

    /// `status = failed`: the originating error first, then artifact notes.
    pub fn failed(self, errors: Vec<String>, pdf_path: Option<PathBuf>) -> ArticleRecord {
        debug_assert!(!errors.is_empty());
        self.into_record(ArticleStatus::Failed, Vec::new(), pdf_path, errors)
    }

    fn into_record(
        self,
        status: ArticleStatus,
        matched_keywords: Vec<String>,
        pdf_path: Option<PathBuf>,
        errors: Vec<String>,
    ) -> ArticleRecord {
        ArticleRecord {
            run_id: self.run_id,
            run_timestamp: self.run_timestamp,
            media: self.media,
            url: self.url,
            title: self.title,
            date_unknown: self.published_at.is_none(),
            published_at: self.published_at,
            matched_keywords,
            snippets: self.snippets,
            per_article_pdf_path: pdf_path.map(|p| p.to_string_lossy().into_owned()),
            status,
            errors,
        }
    }
}

/// The outcome for one article URL in one run, as written to `matches.json`.
///
/// Built only through [`ArticleDraft`], which keeps status, keywords, PDF path
/// and errors consistent with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub run_id: String,
    pub run_timestamp: String,
    pub media: String,
    pub url: String,
    pub title: Option<String>,
    /// ISO-8601 UTC string.
    pub published_at: Option<String>,
    pub date_unknown: bool,
    pub matched_keywords: Vec<String>,
    pub snippets: Vec<String>,
    pub per_article_pdf_path: Option<String>,
    pub status: ArticleStatus,
    pub errors: Vec<String>,
}

/// How a media source fared during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    Ok,
    /// Search worked but at least one article failed.
    Partial,
    /// The source could not be resolved or searched.
    Failed,
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaState::Ok => "ok",
            MediaState::Partial => "partial",
            MediaState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSourceStatus {
    pub media: String,
    pub status: MediaState,
    pub errors: Vec<String>,
}

impl MediaSourceStatus {
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            status: MediaState::Ok,
            errors: Vec::new(),
        }
    }

    /// Source-level failure: nothing was searched or the search itself failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = MediaState::Failed;
        self.errors.push(error.into());
    }

    /// An article of this source failed; a healthy source becomes partial.
    pub fn article_failed(&mut self, errors: &[String]) {
        if self.status == MediaState::Ok {
            self.status = MediaState::Partial;
        }
        self.errors.extend_from_slice(errors);
    }
}

/// Progress notifications emitted while a run is underway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    MediaStart {
        media: String,
        /// Position of the media in the run, starting at 1.
        index: usize,
    },
    MediaError {
        media: String,
        error: String,
    },
    MediaDone {
        media: String,
        status: MediaState,
        errors: Vec<String>,
    },
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub run_timestamp: String,
    pub run_dir: PathBuf,
    pub summary_pdf: PathBuf,
    pub merged_pdf: PathBuf,
    pub matches_json: PathBuf,
    pub records: Vec<ArticleRecord>,
    pub media_statuses: Vec<MediaSourceStatus>,
}

impl RunResult {
    /// Records that produced a PDF.
    pub fn matched(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.records.iter().filter(|r| r.status == ArticleStatus::Ok)
    }
}
