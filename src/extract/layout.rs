//! Layout-aware strategy: pdfium for text, geometry and metadata; lopdf
//! for the image placement scan.
//!
//! pdfium is a C library with thread-local state, so this strategy is only
//! ever driven from a blocking thread (see [`super::ExtractionChain::run`]).

use super::images::{collect_page_images, LopdfPageImages};
use super::spans::TextSpan;
use super::tables::TableDetector;
use super::Extractor;
use crate::error::ExtractError;
use crate::model::{ExtractedDocument, ExtractedImage, ExtractedPage, PageMetadata};
use pdfium_render::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub struct LayoutEngine {
    library_path: Option<PathBuf>,
    detector: TableDetector,
}

impl LayoutEngine {
    /// `library_path` may name the shared library itself or the directory holding it.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self {
            library_path,
            detector: TableDetector::new(),
        }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let local = match &self.library_path {
            Some(path) if path.is_file() => Pdfium::bind_to_library(path),
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
        };
        let bindings = local
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| ExtractError::Pdfium(format!("cannot bind pdfium library: {e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Extractor for LayoutEngine {
    fn name(&self) -> &str {
        "layout"
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| ExtractError::Pdfium(format!("{e:?}")))?;

        let metadata = document_metadata(&document);
        let mut images = page_images(bytes);

        let mut pages = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let page_number = idx + 1;
            let text_page = page
                .text()
                .map_err(|e| ExtractError::Pdfium(format!("page {page_number} text: {e:?}")))?;

            let spans: Vec<TextSpan> = text_page
                .segments()
                .iter()
                .filter_map(|segment| {
                    let text = segment.text();
                    if text.trim().is_empty() {
                        return None;
                    }
                    let bounds = segment.bounds();
                    let height = bounds.top().value - bounds.bottom().value;
                    let mut span =
                        TextSpan::new(text, bounds.left().value, bounds.bottom().value, height.max(1.0));
                    span.width = bounds.right().value - bounds.left().value;
                    Some(span)
                })
                .collect();

            let rotation = match page.rotation() {
                Ok(PdfPageRenderRotation::Degrees90) => 90,
                Ok(PdfPageRenderRotation::Degrees180) => 180,
                Ok(PdfPageRenderRotation::Degrees270) => 270,
                _ => 0,
            };

            pages.push(ExtractedPage {
                page_number,
                text: text_page.all(),
                tables: self.detector.detect(&spans),
                images: images.remove(&page_number).unwrap_or_default(),
                metadata: PageMetadata {
                    width: page.width().value,
                    height: page.height().value,
                    rotation,
                },
            });
        }

        if pages.is_empty() {
            return Err(ExtractError::Empty);
        }

        info!(
            "Layout extraction: {} pages, {} images",
            pages.len(),
            pages.iter().map(|p| p.images.len()).sum::<usize>()
        );
        Ok(ExtractedDocument::new(pages, metadata, self.name()))
    }
}

fn document_metadata(document: &PdfDocument<'_>) -> BTreeMap<String, String> {
    let tags = [
        ("title", PdfDocumentMetadataTagType::Title),
        ("author", PdfDocumentMetadataTagType::Author),
        ("subject", PdfDocumentMetadataTagType::Subject),
        ("keywords", PdfDocumentMetadataTagType::Keywords),
        ("creator", PdfDocumentMetadataTagType::Creator),
        ("producer", PdfDocumentMetadataTagType::Producer),
        ("creation_date", PdfDocumentMetadataTagType::CreationDate),
        ("modification_date", PdfDocumentMetadataTagType::ModificationDate),
    ];

    let metadata = document.metadata();
    tags.into_iter()
        .filter_map(|(key, tag)| {
            let value = metadata.get(tag)?.value().trim().to_string();
            (!value.is_empty()).then(|| (key.to_string(), value))
        })
        .collect()
}

/// Images per 1-based page number. A document lopdf cannot parse simply has none.
fn page_images(bytes: &[u8]) -> HashMap<usize, Vec<ExtractedImage>> {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Image scan unavailable, continuing without images: {}", e);
            return HashMap::new();
        }
    };

    let mut out = HashMap::new();
    for (number, page_id) in doc.get_pages() {
        let page_number = number as usize;
        match LopdfPageImages::scan(&doc, page_id) {
            Ok(source) => {
                let images = collect_page_images(&source, page_number);
                if !images.is_empty() {
                    debug!("Page {}: {} placed images", page_number, images.len());
                    out.insert(page_number, images);
                }
            }
            Err(e) => warn!("Page {}: image scan failed: {}", page_number, e),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, ImageFormat};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Two pages sharing one resources dictionary with one image; only page 2 paints it.
    fn shared_image_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 64, 128, 255],
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => Object::Dictionary(dictionary! { "Im1" => image_id }),
        });

        let mut kids = Vec::new();
        for content in [&b"BT ET"[..], &b"q 120 0 0 90 72 600 cm /Im1 Do Q"[..]] {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(Object::from(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn referenced_but_unpainted_image_is_left_out() {
        let images = page_images(&shared_image_pdf());

        assert!(!images.contains_key(&1));
        let page2 = &images[&2];
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].index, 0);
        assert_eq!(page2[0].format, ImageFormat::Png);
        assert_eq!(page2[0].bbox, BBox::new(72.0, 600.0, 192.0, 690.0));
        assert_eq!((page2[0].width(), page2[0].height()), (120, 90));
    }

    #[test]
    fn unparseable_document_has_no_images() {
        assert!(page_images(b"%PDF-1.4 truncated").is_empty());
    }
}
