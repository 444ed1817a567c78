//! Summary document and PDF concatenation.
//!
//! The summary is plain monospace text laid out as fixed-width tables, which
//! keeps it readable without a layout engine. Merging copies every page of
//! every input, in order, into a fresh document.

use crate::models::{ArticleRecord, MediaSourceStatus};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 36;
const FONT_SIZE: i64 = 7;
const LEADING: i64 = 9;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
const LINE_WIDTH: usize = 124;
const DETAIL_INDENT: &str = "    ";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 32;

/// What the summary document reports on.
#[derive(Debug)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub run_timestamp: &'a str,
    pub last_days: i64,
    pub medias: &'a [String],
    pub keywords: &'a [String],
    pub media_statuses: &'a [MediaSourceStatus],
    /// Only records with status `ok` are listed.
    pub records: &'a [ArticleRecord],
}

/// Render the run summary to `output`.
#[instrument(level = "info", skip_all, fields(path = %output.display()))]
pub fn build_summary_pdf(summary: &RunSummary<'_>, output: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = render_lines(&summary_lines(summary))?;
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(output, bytes)?;
    info!("Wrote summary PDF");
    Ok(())
}

fn summary_lines(summary: &RunSummary<'_>) -> Vec<String> {
    let mut lines = vec![
        "NEWS WATCH RUN SUMMARY".to_string(),
        String::new(),
        format!("Run ID: {}", summary.run_id),
        format!("Timestamp: {}", summary.run_timestamp),
        format!("Last Days: {}", summary.last_days),
        format!("Medias: {}", summary.medias.join(", ")),
        format!("Keywords: {}", summary.keywords.join(", ")),
        String::new(),
        "Per-Media Status".to_string(),
    ];

    let status_widths = [22, 8, LINE_WIDTH - 32];
    lines.extend(table_rows(&["Media", "Status", "Errors"], &status_widths));
    lines.push("-".repeat(LINE_WIDTH));
    for status in summary.media_statuses {
        lines.extend(table_rows(
            &[&status.media, &status.status.to_string(), &status.errors.join("; ")],
            &status_widths,
        ));
    }
    lines.push(String::new());

    let matched: Vec<&ArticleRecord> = summary
        .records
        .iter()
        .filter(|r| r.status == crate::models::ArticleStatus::Ok)
        .collect();
    if matched.is_empty() {
        lines.push("No matched articles.".to_string());
        return lines;
    }

    lines.push("Matched Articles".to_string());
    let article_widths = [16, 20, 24, LINE_WIDTH - 63];
    lines.extend(table_rows(&["Media", "Date", "Keywords", "Title"], &article_widths));
    lines.push("-".repeat(LINE_WIDTH));
    for record in matched {
        let pdf_name = record
            .per_article_pdf_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lines.extend(table_rows(
            &[
                &record.media,
                record.published_at.as_deref().unwrap_or(""),
                &record.matched_keywords.join(", "),
                record.title.as_deref().unwrap_or(""),
            ],
            &article_widths,
        ));
        lines.extend(detail_lines("URL", &record.url));
        lines.extend(detail_lines("PDF", &pdf_name));
    }
    lines
}

/// One table row, spread over as many lines as its tallest wrapped cell.
fn table_rows(cells: &[&str], widths: &[usize]) -> Vec<String> {
    let wrapped: Vec<Vec<String>> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| wrap(cell, width))
        .collect();
    let height = wrapped.iter().map(Vec::len).max().unwrap_or(0);
    (0..height)
        .map(|i| {
            wrapped
                .iter()
                .zip(widths)
                .map(|(column, &width)| {
                    let cell = column.get(i).map(String::as_str).unwrap_or("");
                    format!("{cell:<width$}")
                })
                .collect::<Vec<_>>()
                .join(" ")
                .trim_end()
                .to_string()
        })
        .collect()
}

/// `    URL: ...` with continuation lines aligned under the value.
fn detail_lines(label: &str, value: &str) -> Vec<String> {
    let prefix = format!("{DETAIL_INDENT}{label}: ");
    let hang = " ".repeat(prefix.len());
    wrap(value, LINE_WIDTH - prefix.len())
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                format!("{prefix}{chunk}")
            } else {
                format!("{hang}{chunk}")
            }
        })
        .collect()
}

/// Break `text` into lines of at most `width` characters.
///
/// Lines break between words; a word longer than `width` (typically a URL)
/// is split across lines. Always returns at least one line.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(chars.drain(..width).collect());
        }
        if chars.is_empty() {
            continue;
        }
        if current_len > 0 && current_len + 1 + chars.len() > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += chars.len();
        current.extend(chars);
    }
    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Base-14 fonts only cover Latin-1; keep ASCII and drop accents.
fn pdf_text(line: &str) -> String {
    line.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

/// Lay out text lines on as many A4 pages as needed.
pub fn render_lines(lines: &[String]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let empty = [String::new()];
    let lines = if lines.is_empty() { &empty[..] } else { lines };

    let mut kids: Vec<Object> = Vec::new();
    for chunk in lines.chunks(LINES_PER_PAGE) {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
            ),
            Operation::new("TL", vec![Object::Integer(LEADING)]),
            Operation::new(
                "Td",
                vec![
                    Object::Integer(MARGIN),
                    Object::Integer(PAGE_HEIGHT - MARGIN - LEADING),
                ],
            ),
        ];
        for line in chunk {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(pdf_text(line))],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

fn is_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|d| d.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .is_some_and(|name| name == b"Catalog" || name == b"Pages")
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Concatenate the pages of `inputs`, in order, into `output`.
///
/// # Arguments
///
/// * `inputs` - PDF files to merge; their pages keep their order
/// * `output` - Path of the merged document
///
/// # Returns
///
/// The number of pages written.
///
/// # Errors
///
/// Fails when an input cannot be loaded or the result cannot be saved.
#[instrument(level = "info", skip_all, fields(inputs = inputs.len(), path = %output.display()))]
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<usize, Box<dyn Error>> {
    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut max_id = merged.max_id;
    let mut kids: Vec<Object> = Vec::new();

    for path in inputs {
        let mut doc = Document::load(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        doc.renumber_objects_with(max_id + 1);
        max_id = doc.objects.keys().map(|(id, _)| *id).max().unwrap_or(max_id);

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in page_ids {
            let mut page = doc.get_dictionary(page_id)?.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited(&doc, &page, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            page.set("Parent", pages_id);
            merged.objects.insert(page_id, Object::Dictionary(page));
            kids.push(page_id.into());
        }

        for (id, object) in doc.objects {
            if merged.objects.contains_key(&id) || is_tree_node(&object) {
                continue;
            }
            merged.objects.insert(id, object);
        }
    }

    let count = kids.len();
    merged.max_id = max_id;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.compress();

    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut bytes = Vec::new();
    merged.save_to(&mut bytes)?;
    fs::write(output, bytes)?;
    info!(pages = count, "Wrote merged PDF");
    Ok(count)
}
