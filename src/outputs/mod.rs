//! Run outputs.
//!
//! - [`json`]: `matches.json` with every article record
//! - [`pdf`]: the summary document and the merged PDF
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── <run_id>/
//! │   ├── pdfs/<media>_<safe-title>.pdf
//! │   ├── summary.pdf
//! │   ├── merged.pdf
//! │   └── matches.json
//! └── errors/<run_id>/<media>/<timestamp>_page.{html,png}
//! ```

pub mod json;
pub mod pdf;
