//! Markdown serialization of an [`ExtractedDocument`].
//!
//! The output is meant to be translated, so binary data never appears in
//! it. Each image becomes a reference to `IMAGE_PLACEHOLDER:page_<N>_img_<I>`
//! which [`replace_placeholders`] later swaps for a storage locator.
//!
//! Layout of one page:
//!
//! ```text
//! # Page 3
//!
//! ![Image 1 (200x150 PNG)](IMAGE_PLACEHOLDER:page_3_img_0)
//!
//! <page text, trimmed>
//!
//!
//! **Table 1:**
//!
//! | A | B |
//! | --- | --- |
//! | 1 | 2 |
//!
//!
//! ---
//! ```

use crate::model::{ExtractedDocument, ExtractedPage, ImageRecord, Table};
use crate::store::BinaryStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Prefix of the pseudo-URL carried by every image reference.
pub const PLACEHOLDER_PREFIX: &str = "IMAGE_PLACEHOLDER:";

pub(crate) static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IMAGE_PLACEHOLDER:(page_\d+_img_\d+)").unwrap());

/// Placeholder key for one image, `page_<N>_img_<I>`.
pub fn placeholder_key(page_number: usize, index: usize) -> String {
    format!("page_{page_number}_img_{index}")
}

/// Serializes the whole document.
///
/// The metadata header is only written when `include_metadata` is set and
/// the document carries any metadata.
pub fn serialize(doc: &ExtractedDocument, include_metadata: bool) -> String {
    let mut parts: Vec<String> = Vec::new();

    if include_metadata && !doc.metadata.is_empty() {
        parts.push("---".to_string());
        for (key, value) in &doc.metadata {
            if !value.is_empty() {
                parts.push(format!("{key}: {value}"));
            }
        }
        parts.push("---\n".to_string());
    }

    for page in doc.pages() {
        serialize_page(page, &mut parts);
    }

    parts.join("\n")
}

fn serialize_page(page: &ExtractedPage, parts: &mut Vec<String>) {
    parts.push(format!("# Page {}\n", page.page_number));

    for img in &page.images {
        parts.push(format!(
            "![Image {} ({}x{} {})]({}{})\n",
            img.index + 1,
            img.width(),
            img.height(),
            img.format.tag(),
            PLACEHOLDER_PREFIX,
            placeholder_key(page.page_number, img.index)
        ));
    }

    let text = page.text.trim();
    if !text.is_empty() {
        parts.push(text.to_string());
        parts.push(String::new());
    }

    for (i, table) in page.tables.iter().enumerate() {
        parts.push(format!("\n**Table {}:**\n", i + 1));
        parts.push(table_to_markdown(table));
        parts.push(String::new());
    }

    parts.push("\n---\n".to_string());
}

/// Pipe table with the first row as header. An empty table renders as "".
pub fn table_to_markdown(table: &Table) -> String {
    let Some((header, rows)) = table.split_first() else {
        return String::new();
    };

    let row_line = |cells: &[String]| -> String {
        let cells: Vec<String> = cells.iter().map(|c| escape_cell(c)).collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(table.len() + 1);
    lines.push(row_line(header));
    lines.push(format!("| {} |", vec!["---"; header.len()].join(" | ")));
    for row in rows {
        lines.push(row_line(row));
    }
    lines.join("\n")
}

/// Pipes and line breaks inside a cell would break the row.
fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Replaces every `IMAGE_PLACEHOLDER:<key>` whose key is in `mapping`.
///
/// Unmapped placeholders stay as they are, and a second pass with the same
/// mapping changes nothing.
pub fn replace_placeholders(markdown: &str, mapping: &HashMap<String, String>) -> String {
    RE_PLACEHOLDER
        .replace_all(markdown, |caps: &regex::Captures<'_>| match mapping.get(&caps[1]) {
            Some(locator) => locator.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder keys still present in `markdown`, in order of appearance.
pub fn unresolved_placeholders(markdown: &str) -> Vec<String> {
    RE_PLACEHOLDER
        .captures_iter(markdown)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Uploads every image into `folder` of the store.
///
/// Returns the placeholder → locator mapping for [`replace_placeholders`]
/// and one [`ImageRecord`] per stored image. A failed upload is logged and
/// left out; the rest of the document is unaffected.
pub fn persist_images(
    doc: &ExtractedDocument,
    store: &dyn BinaryStore,
    folder: &str,
) -> (HashMap<String, String>, Vec<ImageRecord>) {
    let mut mapping = HashMap::new();
    let mut records = Vec::new();

    for page in doc.pages() {
        for img in &page.images {
            let key = placeholder_key(page.page_number, img.index);
            let name = format!("{key}.{}", img.format.extension());
            match store.put(&img.data, &name, img.format.mime(), folder) {
                Ok(locator) => {
                    debug!("Stored {} → {}", key, locator);
                    mapping.insert(key.clone(), locator.clone());
                    records.push(ImageRecord {
                        page_number: page.page_number,
                        index: img.index,
                        key,
                        locator,
                        bbox: img.bbox,
                        format: img.format,
                        size_bytes: img.data.len(),
                    });
                }
                Err(e) => warn!("Image {} not stored: {}", key, e),
            }
        }
    }

    (mapping, records)
}

/// Serialize, persist images, and resolve placeholders in one go.
pub fn serialize_with_store(
    doc: &ExtractedDocument,
    include_metadata: bool,
    store: &dyn BinaryStore,
    folder: &str,
) -> (String, Vec<ImageRecord>) {
    let markdown = serialize(doc, include_metadata);
    let (mapping, records) = persist_images(doc, store, folder);
    (replace_placeholders(&markdown, &mapping), records)
}
