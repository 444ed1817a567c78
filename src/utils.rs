//! Small helpers shared across the pipeline.
//!
//! - Order-preserving deduplication
//! - File-name sanitizing for per-article PDFs
//! - Run identifier generation
//! - String truncation for logging
//! - Output directory preparation
//! - Operator pauses for interactive runs

use crate::text::normalize_text;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rand::{Rng, rng};
use std::error::Error;
use std::fs as stdfs;
use std::io::IsTerminal;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument};

const RUN_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Remove duplicates while keeping the first occurrence of each item.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(unique_preserve_order(["a", "b", "a", "c", "b"]), vec!["a", "b", "c"]);
/// ```
pub fn unique_preserve_order<I, T>(items: I) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    T: Eq + std::hash::Hash + Clone,
{
    items.into_iter().unique().collect()
}

/// Turn an article title (or URL) into a file-name stem.
///
/// Accents are stripped, everything outside `[a-z0-9-_. ]` is dropped,
/// spaces become hyphens, and the result is capped at `max_len` characters.
/// Falls back to `"item"` when nothing usable is left.
pub fn safe_filename(text: &str, max_len: usize) -> String {
    let kept: String = normalize_text(text)
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_. ".contains(*c))
        .collect();
    let hyphenated = kept.replace(' ', "-");
    let trimmed = hyphenated.trim_matches('-');
    if trimmed.is_empty() {
        return "item".to_string();
    }
    trimmed.chars().take(max_len).collect()
}

/// Build a run identifier: `<job>_<YYYYmmdd_HHMMSS>_<4 random chars>`.
///
/// Without a job name the prefix is `run`.
pub fn generate_run_id(job_name: Option<&str>, now: DateTime<Utc>) -> String {
    let mut r = rng();
    let suffix: String = (0..4)
        .map(|_| RUN_ID_ALPHABET[r.random_range(0..RUN_ID_ALPHABET.len())] as char)
        .collect();
    format!(
        "{}_{}_{}",
        job_name.unwrap_or("run"),
        now.format("%Y%m%d_%H%M%S"),
        suffix
    )
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters and get an ellipsis and the
/// number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Wait for the operator to press Enter.
///
/// Returns immediately when stdin is not a terminal, so unattended runs
/// never block here.
pub async fn pause(message: &str) {
    if !std::io::stdin().is_terminal() {
        debug!(message, "Skipping pause; stdin is not a terminal");
        return;
    }
    eprintln!("{message}");
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    let _ = reader.read_line(&mut line).await;
}
