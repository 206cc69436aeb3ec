//! Last-resort strategy: plain text per page via pdf-extract.

use super::Extractor;
use crate::error::ExtractError;
use crate::model::{ExtractedDocument, ExtractedPage};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MinimalFallback;

impl Extractor for MinimalFallback {
    fn name(&self) -> &str {
        "minimal"
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::PdfExtract(e.to_string()))?;
        if texts.is_empty() {
            return Err(ExtractError::Empty);
        }
        debug!("pdf-extract returned {} pages", texts.len());

        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut page = ExtractedPage::new(i + 1);
                page.text = text;
                page
            })
            .collect();

        Ok(ExtractedDocument::new(pages, BTreeMap::new(), self.name()))
    }
}
