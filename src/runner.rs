//! Run orchestration.
//!
//! One run walks the configured medias in order, strictly sequentially:
//!
//! ```text
//! for media in medias:
//!     media_start
//!     resolve source        -- unknown --> failed, media_error
//!     collect candidates    -- error   --> failed, media_error
//!     process each article (rate-limited)
//!     media_done
//! quit browser
//! summary.pdf -> merged.pdf -> matches.json
//! ```
//!
//! The browser session is owned by the run and is quit on every exit path
//! once it has been handed over.

use crate::browser::PageDriver;
use crate::collector::SearchCollector;
use crate::config::RunConfig;
use crate::dates::to_iso_utc;
use crate::fetch::{
    BrowserSource, HttpFetcher, PageSource, RetryFetch, SEARCH_RETRIES, SEARCH_RETRY_BASE,
};
use crate::media::registry;
use crate::models::{ArticleRecord, ArticleStatus, MediaSourceStatus, ProgressEvent, RunResult};
use crate::outputs::json::write_matches;
use crate::outputs::pdf::{RunSummary, build_summary_pdf, merge_pdfs};
use crate::processor::ArticleProcessor;
use crate::utils::{ensure_writable_dir, generate_run_id};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub type ProgressCallback = Box<dyn Fn(&ProgressEvent)>;

/// Executes runs for one [`RunConfig`].
pub struct Runner {
    config: RunConfig,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Receive a [`ProgressEvent`] as each media starts, fails or finishes.
    pub fn with_progress(mut self, callback: impl Fn(&ProgressEvent) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }

    /// Run the configured keywords and medias, searching over HTTP unless
    /// `search_use_browser` is set.
    ///
    /// # Arguments
    ///
    /// * `driver` - Browser session used for articles; it is quit before returning
    /// * `job_name` - Name used as the run id prefix, `None` for ad-hoc runs
    ///
    /// # Returns
    ///
    /// The run result with every article record, the per-media statuses and
    /// the paths of the summary, merged PDF and `matches.json`.
    ///
    /// # Errors
    ///
    /// Fails only when the HTTP client cannot be built or the run directory
    /// is not writable. Media and article failures are recorded in the result.
    pub async fn run_job<D: PageDriver>(
        &self,
        driver: D,
        job_name: Option<&str>,
    ) -> Result<RunResult, Box<dyn Error>> {
        let fetcher = match HttpFetcher::new(
            self.config.user_agent.as_deref(),
            self.config.request_timeout(),
        ) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                release(driver).await;
                return Err(e);
            }
        };
        let http = RetryFetch::new(fetcher, SEARCH_RETRIES, SEARCH_RETRY_BASE);
        self.run_job_with(driver, http, job_name).await
    }

    /// Like [`run_job`](Self::run_job) with an explicit source for the HTTP
    /// search path.
    #[instrument(level = "info", skip_all, fields(job = job_name.unwrap_or("adhoc")))]
    pub async fn run_job_with<D: PageDriver, S: PageSource>(
        &self,
        mut driver: D,
        mut http: S,
        job_name: Option<&str>,
    ) -> Result<RunResult, Box<dyn Error>> {
        let started = Utc::now();
        let run_id = generate_run_id(job_name, started);
        let run_timestamp = to_iso_utc(started);
        let output_dir = PathBuf::from(&self.config.output_dir);
        let run_dir = output_dir.join(&run_id);
        let pdf_dir = run_dir.join("pdfs");

        if let Err(e) = ensure_writable_dir(&pdf_dir).await {
            error!(
                path = %pdf_dir.display(),
                error = %e,
                "Run directory is not writable (fix perms or choose a different output dir)"
            );
            release(driver).await;
            return Err(e);
        }
        info!(%run_id, medias = self.config.medias.len(), keywords = self.config.keywords.len(), "Run starting");

        let processor = ArticleProcessor {
            run_id: run_id.clone(),
            run_timestamp: run_timestamp.clone(),
            keywords: self.config.keywords.clone(),
            wait_timeout: self.config.wait_timeout(),
            pdf_dir,
            error_dir: output_dir.join("errors").join(&run_id),
            pause_after_load: self.config.pause,
            pause_on_error: self.config.pause_on_error,
        };

        let mut records = Vec::new();
        let mut media_statuses = Vec::new();
        for (index, media_id) in self.config.medias.iter().enumerate() {
            self.emit(ProgressEvent::MediaStart {
                media: media_id.clone(),
                index: index + 1,
            });
            let status = self
                .crawl_media(&mut driver, &mut http, &processor, media_id, started, &mut records)
                .await;
            self.emit(ProgressEvent::MediaDone {
                media: media_id.clone(),
                status: status.status,
                errors: status.errors.clone(),
            });
            media_statuses.push(status);
        }
        release(driver).await;

        let result = RunResult {
            summary_pdf: run_dir.join("summary.pdf"),
            merged_pdf: run_dir.join("merged.pdf"),
            matches_json: run_dir.join("matches.json"),
            run_dir,
            run_id,
            run_timestamp,
            records,
            media_statuses,
        };
        self.write_outputs(&result).await;

        info!(
            run_id = %result.run_id,
            records = result.records.len(),
            matched = result.matched().count(),
            "Run finished"
        );
        Ok(result)
    }

    /// Search one media and process its candidates; never fails.
    #[instrument(level = "info", skip(self, driver, http, processor, reference, records))]
    async fn crawl_media<D: PageDriver, S: PageSource>(
        &self,
        driver: &mut D,
        http: &mut S,
        processor: &ArticleProcessor,
        media_id: &str,
        reference: DateTime<Utc>,
        records: &mut Vec<ArticleRecord>,
    ) -> MediaSourceStatus {
        let mut status = MediaSourceStatus::new(media_id);

        let Some(source) = registry::resolve(media_id, &self.config.extra_medias) else {
            self.media_error(&mut status, format!("Unknown media: {media_id}"));
            return status;
        };

        let collector = SearchCollector::new(&source, self.config.collect_limits(), reference);
        let collected = if self.config.search_use_browser {
            let mut browser =
                BrowserSource::new(&mut *driver, self.config.wait_timeout(), self.config.pause);
            collector.collect(&mut browser, &self.config.keywords).await
        } else {
            collector.collect(http, &self.config.keywords).await
        };
        let candidates = match collected {
            Ok(set) => set.into_candidates(),
            Err(e) => {
                self.media_error(&mut status, format!("Search failed for {media_id}: {e}"));
                return status;
            }
        };

        for candidate in &candidates {
            let record = processor.process(driver, media_id, candidate).await;
            if record.status == ArticleStatus::Failed {
                status.article_failed(&record.errors);
            }
            records.push(record);
            sleep(self.config.rate_limit()).await;
        }
        info!(candidates = candidates.len(), status = %status.status, "Media finished");
        status
    }

    fn media_error(&self, status: &mut MediaSourceStatus, message: String) {
        warn!(media = %status.media, error = %message, "Media failed");
        status.fail(message.clone());
        self.emit(ProgressEvent::MediaError {
            media: status.media.clone(),
            error: message,
        });
    }

    /// Summary, merged PDF and `matches.json`; failures are logged only.
    async fn write_outputs(&self, result: &RunResult) {
        let summary = RunSummary {
            run_id: &result.run_id,
            run_timestamp: &result.run_timestamp,
            last_days: self.config.last_days,
            medias: &self.config.medias,
            keywords: &self.config.keywords,
            media_statuses: &result.media_statuses,
            records: &result.records,
        };

        let mut merge_inputs = Vec::new();
        match build_summary_pdf(&summary, &result.summary_pdf) {
            Ok(()) => merge_inputs.push(result.summary_pdf.clone()),
            Err(e) => error!(error = %e, "Failed to build summary PDF"),
        }
        merge_inputs.extend(
            result
                .matched()
                .filter_map(|r| r.per_article_pdf_path.as_deref())
                .map(PathBuf::from)
                .filter(|p| p.exists()),
        );
        if let Err(e) = merge_pdfs(&merge_inputs, &result.merged_pdf) {
            error!(error = %e, "Failed to merge PDFs");
        }

        if let Err(e) = write_matches(&result.records, &result.matches_json).await {
            error!(error = %e, "Failed to write matches JSON");
        }
    }
}

async fn release<D: PageDriver>(driver: D) {
    match driver.quit().await {
        Ok(()) => info!("Browser session closed"),
        Err(e) => warn!(error = %e, "Failed to close browser session"),
    }
}
