//! # Lux News Watch
//!
//! Watches Luxembourg news sites for keywords and archives the matching
//! articles as PDFs.
//!
//! ## Features
//!
//! - Searches seventeen Luxembourg news sites (RTL, Wort, Paperjam, Delano,
//!   Virgule, ...) through their own search pages
//! - Keeps hits published within the last N days
//! - Opens each hit in a real browser (WebDriver), checks the rendered text
//!   for the keywords, and prints matching articles to PDF
//! - Writes a summary PDF, one merged PDF and `matches.json` per run
//!
//! ## Usage
//!
//! ```sh
//! chromedriver --port=9515 &
//! lux_news_watch run --config daily
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Search**: Collect candidate article URLs per media and keyword
//! 2. **Inspect**: Load each candidate, extract title, date and text
//! 3. **Classify**: Keyword match → PDF, no match → skipped, error → diagnostics
//! 4. **Output**: Summary PDF, merged PDF and `matches.json`

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod browser;
mod cli;
mod collector;
mod config;
mod dates;
mod fetch;
mod media;
mod models;
mod outputs;
mod processor;
mod runner;
mod text;
mod utils;

use browser::webdriver::WebDriverPage;
use cli::{Cli, Command, RunArgs, SearchArgs};
use collector::SearchCollector;
use config::{JobsFile, RunConfig, resolve_jobs};
use fetch::{HttpFetcher, RetryFetch, SEARCH_RETRIES, SEARCH_RETRY_BASE};
use models::ProgressEvent;
use runner::Runner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();

    let outcome = match args.command {
        Command::Run(run) => run_jobs(run).await,
        Command::Search(search) => search_once(search).await,
        Command::Medias => {
            for media in media::registry::all() {
                println!("{:<22} {}", media.media_id, media.search_url);
            }
            Ok(())
        }
    };

    match &outcome {
        Ok(()) => info!(elapsed_ms = start_time.elapsed().as_millis() as u64, "Done"),
        Err(e) => error!(error = %e, "Exiting with error"),
    }
    outcome
}

fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::MediaStart { media, index } => info!(%media, index, "Media started"),
        ProgressEvent::MediaError { media, error } => error!(%media, %error, "Media error"),
        ProgressEvent::MediaDone {
            media,
            status,
            errors,
        } => info!(%media, %status, errors = errors.len(), "Media done"),
    }
}

/// Every `(job name, config)` pair the arguments ask for.
fn plan_runs(args: &RunArgs, jobs_file: &JobsFile) -> Result<Vec<(Option<String>, RunConfig)>, Box<dyn Error>> {
    let mut base = args.to_config();
    base.extra_medias = jobs_file.medias.clone();

    if let Some(name) = &args.config {
        return Ok(resolve_jobs(name, &jobs_file.jobs)?
            .into_iter()
            .map(|job| (Some(job.name.clone()), base.for_job(&job)))
            .collect());
    }
    if args.keywords.is_empty() && args.medias.is_empty() && !jobs_file.jobs.is_empty() {
        return Ok(jobs_file
            .jobs
            .iter()
            .map(|job| (Some(job.name.clone()), base.for_job(job)))
            .collect());
    }
    if args.keywords.is_empty() || args.medias.is_empty() {
        return Err("provide --keyword and --media, or use --config".into());
    }
    Ok(vec![(None, base)])
}

#[instrument(level = "info", skip_all)]
async fn run_jobs(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let jobs_file = match &args.jobs_file {
        Some(path) => JobsFile::load(path).await?,
        None => JobsFile::default(),
    };

    for (job_name, config) in plan_runs(&args, &jobs_file)? {
        config.validate()?;
        let driver = match WebDriverPage::connect(&config.browser_options()).await {
            Ok(driver) => driver,
            Err(e) => {
                error!(
                    url = %config.webdriver_url,
                    error = %e,
                    "Could not start a browser session (is the WebDriver server running?)"
                );
                return Err(e);
            }
        };

        let result = Runner::new(config)
            .with_progress(log_progress)
            .run_job(driver, job_name.as_deref())
            .await?;
        println!(
            "Run {} completed: {}",
            result.run_id,
            result.merged_pdf.display()
        );
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(media = %args.media, keyword = %args.keyword))]
async fn search_once(args: SearchArgs) -> Result<(), Box<dyn Error>> {
    let extra = match &args.jobs_file {
        Some(path) => JobsFile::load(path).await?.medias,
        None => Vec::new(),
    };
    let source = media::registry::resolve(&args.media, &extra)
        .ok_or_else(|| format!("Unknown media: {}", args.media))?;
    let config = args.to_config();
    config.validate()?;

    let fetcher = HttpFetcher::new(config.user_agent.as_deref(), config.request_timeout())?;
    let mut http = RetryFetch::new(fetcher, SEARCH_RETRIES, SEARCH_RETRY_BASE);
    let hits = SearchCollector::new(&source, config.collect_limits(), Utc::now())
        .collect_keyword(&mut http, &args.keyword)
        .await?;

    println!("Found {} hits for {} on {}", hits.len(), args.keyword, args.media);
    for hit in hits.iter().take(args.limit) {
        println!("- {} | {}", hit.url, hit.title.as_deref().unwrap_or(""));
    }
    Ok(())
}
