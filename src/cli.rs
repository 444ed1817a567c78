//! Command-line interface definitions.
//!
//! This module defines the subcommands and their options using the `clap`
//! crate. The WebDriver URL and output directory can also be provided via
//! environment variables.

use crate::browser::webdriver::Browser;
use crate::config::{DEFAULT_OUTPUT_DIR, DEFAULT_WEBDRIVER_URL, RunConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Watch Luxembourg news sites for keywords and archive matching articles.
///
/// # Examples
///
/// ```sh
/// # Both built-in daily jobs
/// lux_news_watch run --config daily
///
/// # Ad-hoc search on two medias
/// lux_news_watch run -k CSSF -k "Place financière" -m rtl.lu -m paperjam.lu --last-days 7
///
/// # Check what a media's search page yields
/// lux_news_watch search --media wort.lu --keyword BGL
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a named job, the jobs of a jobs file, or an ad-hoc search
    Run(RunArgs),
    /// Search one media for one keyword and print the hits
    Search(SearchArgs),
    /// List the built-in medias and their search URLs
    Medias,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Named job: daily, daily_job_1, daily_job_2, or a job from --jobs-file
    #[arg(short, long)]
    pub config: Option<String>,

    /// YAML file with additional jobs and medias
    #[arg(short, long)]
    pub jobs_file: Option<PathBuf>,

    /// Keyword to search for (repeatable)
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Media identifier to search (repeatable)
    #[arg(short, long = "media")]
    pub medias: Vec<String>,

    /// Look-back window in days
    #[arg(long, default_value_t = 2)]
    pub last_days: i64,

    /// Output directory for run folders
    #[arg(short, long, env = "LUXNEWS_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: String,

    /// Result pages fetched per keyword
    #[arg(long, default_value_t = 1)]
    pub max_pages: usize,

    /// Hits kept per keyword
    #[arg(long, default_value_t = 200)]
    pub max_results: usize,

    /// Seconds to wait between page fetches and between articles
    #[arg(long, default_value_t = 0.5)]
    pub rate_limit: f64,

    /// Load search pages in the browser instead of over HTTP
    #[arg(long)]
    pub search_use_browser: bool,

    /// Wait for Enter after each loaded page
    #[arg(long)]
    pub pause: bool,

    /// Wait for Enter after each failed article
    #[arg(long)]
    pub pause_on_error: bool,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

#[derive(Args, Debug)]
pub struct BrowserArgs {
    /// Browser to drive
    #[arg(long, value_enum, default_value_t = Browser::Chrome)]
    pub browser: Browser,

    /// WebDriver server (chromedriver / msedgedriver)
    #[arg(long, env = "WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Override the User-Agent for HTTP and browser requests
    #[arg(long)]
    pub user_agent: Option<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Media identifier
    #[arg(short, long)]
    pub media: String,

    /// Keyword to search for
    #[arg(short, long)]
    pub keyword: String,

    /// Look-back window in days
    #[arg(long, default_value_t = 2)]
    pub last_days: i64,

    /// Result pages to fetch
    #[arg(long, default_value_t = 1)]
    pub max_pages: usize,

    /// Number of hits to print
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// YAML file whose medias extend the built-in registry
    #[arg(short, long)]
    pub jobs_file: Option<PathBuf>,
}

impl RunArgs {
    /// Configuration for an ad-hoc run; named jobs replace keywords, medias
    /// and window with [`RunConfig::for_job`].
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            keywords: self.keywords.clone(),
            medias: self.medias.clone(),
            last_days: self.last_days,
            browser: self.browser.browser,
            webdriver_url: self.browser.webdriver_url.clone(),
            headless: !self.browser.headed,
            output_dir: self.output_dir.clone(),
            max_pages: self.max_pages,
            max_results: self.max_results,
            pause: self.pause,
            pause_on_error: self.pause_on_error,
            rate_limit_seconds: self.rate_limit,
            search_use_browser: self.search_use_browser,
            user_agent: self.browser.user_agent.clone(),
            ..RunConfig::default()
        }
    }
}

impl SearchArgs {
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            keywords: vec![self.keyword.clone()],
            medias: vec![self.media.clone()],
            last_days: self.last_days,
            max_pages: self.max_pages,
            ..RunConfig::default()
        }
    }
}
