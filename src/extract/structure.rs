//! Table-specialist strategy built on lopdf alone.
//!
//! Reads text through lopdf's own extractor and recovers tables from the
//! positioned spans of each content stream. It never looks at images, which
//! makes it the cheaper second attempt when pdfium is unavailable.

use super::objects::{inherited, rect, resolve};
use super::spans::{decode_plain, page_spans};
use super::tables::TableDetector;
use super::Extractor;
use crate::error::ExtractError;
use crate::model::{ExtractedDocument, ExtractedPage, PageMetadata};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// US Letter, used when a page carries no usable `/MediaBox`.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

#[derive(Debug, Default)]
pub struct TableSpecialist {
    detector: TableDetector,
}

impl TableSpecialist {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extractor for TableSpecialist {
    fn name(&self) -> &str {
        "table"
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(ExtractError::Empty);
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for (number, page_id) in page_ids {
            let spans = page_spans(&doc, page_id).unwrap_or_else(|e| {
                warn!("Page {}: content scan failed: {}", number, e);
                Vec::new()
            });

            let text = match doc.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    debug!("Page {}: lopdf text failed ({}), using spans", number, e);
                    spans.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n")
                }
            };

            let mut page = ExtractedPage::new(number as usize);
            page.text = text;
            page.tables = self.detector.detect(&spans);
            page.metadata = page_metadata(&doc, page_id);
            pages.push(page);
        }

        Ok(ExtractedDocument::new(pages, info_metadata(&doc), self.name()))
    }
}

fn page_metadata(doc: &Document, page_id: ObjectId) -> PageMetadata {
    let media_box = inherited(doc, page_id, b"MediaBox")
        .ok()
        .flatten()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(rect)
        .unwrap_or(DEFAULT_MEDIA_BOX);
    let rotation = inherited(doc, page_id, b"Rotate")
        .ok()
        .flatten()
        .and_then(|obj| obj.as_i64().ok())
        .map(|r| r.rem_euclid(360) as i32)
        .unwrap_or(0);

    PageMetadata {
        width: (media_box[2] - media_box[0]).abs(),
        height: (media_box[3] - media_box[1]).abs(),
        rotation,
    }
}

/// String entries of the trailer's `/Info` dictionary, keyed like the layout strategy's.
fn info_metadata(doc: &Document) -> BTreeMap<String, String> {
    let keys: [(&[u8], &str); 8] = [
        (b"Title", "title"),
        (b"Author", "author"),
        (b"Subject", "subject"),
        (b"Keywords", "keywords"),
        (b"Creator", "creator"),
        (b"Producer", "producer"),
        (b"CreationDate", "creation_date"),
        (b"ModDate", "modification_date"),
    ];

    let Some(info) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve(doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok())
    else {
        return BTreeMap::new();
    };

    keys.into_iter()
        .filter_map(|(pdf_key, key)| match info.get(pdf_key) {
            Ok(Object::String(bytes, _)) => {
                let value = decode_plain(bytes).trim().to_string();
                (!value.is_empty()).then(|| (key.to_string(), value))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    /// One page with a 3-row table and an image resource it never paints.
    fn table_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0],
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => Object::Dictionary(dictionary! { "F1" => font_id }),
            "XObject" => Object::Dictionary(dictionary! { "Im1" => image_id }),
        });

        let content = b"BT /F1 10 Tf \
            1 0 0 1 72 700 Tm (Name) Tj 1 0 0 1 200 700 Tm (Age) Tj \
            1 0 0 1 72 685 Tm (Alice) Tj 1 0 0 1 200 685 Tm (30) Tj \
            1 0 0 1 72 670 Tm (Bob) Tj 1 0 0 1 200 670 Tm (25) Tj ET";
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Rotate" => 90,
            }),
        );
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly Report"),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_table_geometry_and_info() {
        let doc = TableSpecialist::new().extract(&table_pdf()).unwrap();
        assert_eq!(doc.extractor, "table");
        assert_eq!(doc.total_pages(), 1);

        let page = &doc.pages()[0];
        assert_eq!(page.tables.len(), 1);
        assert_eq!(page.tables[0][0], vec!["Name".to_string(), "Age".to_string()]);
        assert_eq!(page.tables[0].len(), 3);
        assert_eq!(page.metadata.width, 595.0);
        assert_eq!(page.metadata.height, 842.0);
        assert_eq!(page.metadata.rotation, 90);
        assert!(page.images.is_empty());

        assert_eq!(doc.metadata.get("title").map(String::as_str), Some("Quarterly Report"));
    }

    #[test]
    fn unpainted_image_leaves_page_without_images() {
        let doc = TableSpecialist::new().extract(&table_pdf()).unwrap();
        let page = &doc.pages()[0];
        assert!(page.images.is_empty());
        assert_eq!(page.tables.len(), 1);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(TableSpecialist::new().extract(b"%PDF-1.4 not really").is_err());
    }
}
