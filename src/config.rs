//! Run configuration and named jobs.
//!
//! A [`RunConfig`] fully describes one run. It is usually built from a
//! [`JobConfig`] (keywords, medias, window) plus the command-line overrides.
//! Jobs come from the built-in set ([`default_jobs`]) or from a YAML jobs
//! file:
//!
//! ```yaml
//! jobs:
//!   - name: weekly_banks
//!     keywords: [BGL, Spuerkeess]
//!     medias: [rtl.lu, wort.lu]
//!     last_days: 7
//! medias:
//!   - media_id: example.lu
//!     search_url: https://example.lu/?s={query}
//!     domain: example.lu
//! ```

use crate::browser::webdriver::{Browser, BrowserOptions};
use crate::collector::CollectLimits;
use crate::media::MediaSource;
use crate::text::normalize_text;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// Everything one run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub keywords: Vec<String>,
    pub medias: Vec<String>,
    /// Recency window in days.
    pub last_days: i64,
    pub browser: Browser,
    pub webdriver_url: String,
    pub headless: bool,
    pub output_dir: String,
    pub max_pages: usize,
    pub max_results: usize,
    /// Wait for Enter after each loaded page.
    pub pause: bool,
    /// Wait for Enter after each failed article.
    pub pause_on_error: bool,
    pub rate_limit_seconds: f64,
    pub request_timeout: f64,
    pub page_timeout: f64,
    pub wait_timeout: f64,
    /// Load search pages in the browser instead of over plain HTTP.
    pub search_use_browser: bool,
    pub user_agent: Option<String>,
    /// Media definitions that extend or override the built-in registry.
    pub extra_medias: Vec<MediaSource>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            medias: Vec::new(),
            last_days: 2,
            browser: Browser::default(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            max_pages: 1,
            max_results: 200,
            pause: false,
            pause_on_error: false,
            rate_limit_seconds: 0.5,
            request_timeout: 20.0,
            page_timeout: 30.0,
            wait_timeout: 20.0,
            search_use_browser: false,
            user_agent: None,
            extra_medias: Vec::new(),
        }
    }
}

/// Seconds from configuration; negative or non-finite values mean zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl RunConfig {
    /// This configuration with a job's keywords, medias and window.
    pub fn for_job(&self, job: &JobConfig) -> Self {
        Self {
            keywords: job.keywords.clone(),
            medias: job.medias.clone(),
            last_days: job.last_days,
            ..self.clone()
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.keywords.is_empty() {
            return Err("at least one keyword is required".into());
        }
        if let Some(blank) = self.keywords.iter().find(|k| normalize_text(k).is_empty()) {
            return Err(format!("keywords must not be blank, got {blank:?}").into());
        }
        if self.medias.is_empty() {
            return Err("at least one media is required".into());
        }
        if self.last_days < 0 {
            return Err(format!("last_days must not be negative, got {}", self.last_days).into());
        }
        if self.max_pages == 0 {
            return Err("max_pages must be at least 1".into());
        }
        Ok(())
    }

    pub fn collect_limits(&self) -> CollectLimits {
        CollectLimits {
            max_pages: self.max_pages,
            max_results: self.max_results,
            window_days: self.last_days,
            delay: self.rate_limit(),
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            browser: self.browser,
            webdriver_url: self.webdriver_url.clone(),
            headless: self.headless,
            page_timeout: seconds(self.page_timeout),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn rate_limit(&self) -> Duration {
        seconds(self.rate_limit_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        seconds(self.request_timeout)
    }

    pub fn wait_timeout(&self) -> Duration {
        seconds(self.wait_timeout)
    }
}

fn default_last_days() -> i64 {
    2
}

/// A named set of keywords searched on a set of medias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub medias: Vec<String>,
    #[serde(default = "default_last_days")]
    pub last_days: i64,
}

impl JobConfig {
    fn new(name: &str, keywords: &[&str], medias: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            medias: medias.iter().map(|s| s.to_string()).collect(),
            last_days: default_last_days(),
        }
    }
}

/// Contents of a YAML jobs file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobsFile {
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    /// Media sources added to (or replacing) the built-in registry.
    #[serde(default)]
    pub medias: Vec<MediaSource>,
}

impl JobsFile {
    pub fn from_yaml(text: &str) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_str(text)?)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read jobs file {}: {e}", path.display()))?;
        let file = Self::from_yaml(&text)?;
        info!(jobs = file.jobs.len(), medias = file.medias.len(), "Loaded jobs file");
        Ok(file)
    }
}

/// The built-in daily jobs.
pub fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig::new(
            "daily_job_1",
            &["BGL", "BNP PARIBAS", "ARVAL", "CARDIF", "MICROLUX", "BOB KIEFFER"],
            &["rtl.lu", "delano.lu"],
        ),
        JobConfig::new(
            "daily_job_2",
            &["FMI", "PLACE FINANCIÈRE", "BCL", "CSSF"],
            &["rtl.lu", "virgule.lu"],
        ),
    ]
}

/// Jobs selected by `name`.
///
/// `daily` selects both built-in jobs. Jobs from a jobs file shadow
/// built-in jobs of the same name.
pub fn resolve_jobs(name: &str, extra: &[JobConfig]) -> Result<Vec<JobConfig>, Box<dyn Error>> {
    if let Some(job) = extra.iter().find(|j| j.name == name) {
        return Ok(vec![job.clone()]);
    }
    let defaults = default_jobs();
    if name == "daily" {
        return Ok(defaults);
    }
    defaults
        .into_iter()
        .find(|j| j.name == name)
        .map(|j| vec![j])
        .ok_or_else(|| format!("Unknown config: {name}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.last_days, 2);
        assert_eq!(config.max_pages, 1);
        assert_eq!(config.max_results, 200);
        assert_eq!(config.rate_limit(), Duration::from_millis(500));
        assert_eq!(config.wait_timeout(), Duration::from_secs(20));
        assert_eq!(config.browser_options().page_timeout, Duration::from_secs(30));
        assert!(config.headless);
    }

    #[test]
    fn test_negative_durations_become_zero() {
        let config = RunConfig {
            rate_limit_seconds: -1.0,
            ..RunConfig::default()
        };
        assert_eq!(config.rate_limit(), Duration::ZERO);
    }

    #[test]
    fn test_resolve_daily_and_named_jobs() {
        let daily = resolve_jobs("daily", &[]).unwrap();
        let names: Vec<_> = daily.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["daily_job_1", "daily_job_2"]);

        let job2 = resolve_jobs("daily_job_2", &[]).unwrap();
        assert_eq!(job2[0].medias, vec!["rtl.lu", "virgule.lu"]);
        assert!(job2[0].keywords.contains(&"PLACE FINANCIÈRE".to_string()));

        let err = resolve_jobs("weekly", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown config: weekly");
    }

    #[test]
    fn test_jobs_file_parsing_and_shadowing() {
        let yaml = r#"
jobs:
  - name: daily_job_1
    keywords: [Spuerkeess]
    medias: [wort.lu]
  - name: weekly
    keywords: [CSSF]
    medias: [example.lu]
    last_days: 7
medias:
  - media_id: example.lu
    search_url: "https://example.lu/?s={query}"
    domain: example.lu
"#;
        let file = JobsFile::from_yaml(yaml).unwrap();
        assert_eq!(file.jobs.len(), 2);
        assert_eq!(file.jobs[0].last_days, 2);
        assert_eq!(file.medias[0].exclude_url_substrings.len(), 8);

        let shadowed = resolve_jobs("daily_job_1", &file.jobs).unwrap();
        assert_eq!(shadowed[0].keywords, vec!["Spuerkeess"]);
        let weekly = resolve_jobs("weekly", &file.jobs).unwrap();
        assert_eq!(weekly[0].last_days, 7);
    }

    #[test]
    fn test_for_job_keeps_overrides() {
        let base = RunConfig {
            output_dir: "/tmp/out".to_string(),
            search_use_browser: true,
            ..RunConfig::default()
        };
        let job = &default_jobs()[0];
        let config = base.for_job(job);
        assert_eq!(config.keywords, job.keywords);
        assert_eq!(config.output_dir, "/tmp/out");
        assert!(config.search_use_browser);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_runs() {
        assert!(RunConfig::default().validate().is_err());
        let config = RunConfig {
            keywords: vec!["BGL".to_string()],
            medias: vec!["rtl.lu".to_string()],
            max_pages: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_any_blank_keyword() {
        let config = RunConfig {
            keywords: vec!["BGL".to_string(), "  ".to_string()],
            medias: vec!["rtl.lu".to_string()],
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("blank"));

        let config = RunConfig {
            keywords: vec!["BGL".to_string()],
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_config_uses_defaults() {
        let config: RunConfig =
            serde_yaml::from_str("keywords: [BGL]\nmedias: [rtl.lu]\nbrowser: edge\n").unwrap();
        assert_eq!(config.browser, Browser::Edge);
        assert_eq!(config.max_results, 200);
    }
}
