//! `matches.json`: every [`ArticleRecord`] of a run.
//!
//! The file is a pretty-printed JSON array with object keys sorted, so
//! successive runs diff cleanly.

use crate::models::ArticleRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write the run's records to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_matches(records: &[ArticleRecord], path: &Path) -> Result<(), Box<dyn Error>> {
    let rows = records
        .iter()
        .map(|r| serde_json::to_value(r).and_then(serde_json::from_value))
        .collect::<Result<Vec<BTreeMap<String, Value>>, _>>()?;
    let json = serde_json::to_string_pretty(&rows)?;

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!("Wrote matches JSON");
    Ok(())
}
