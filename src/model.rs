//! Document model shared by extraction, serialization and rendering.
//!
//! An [`ExtractedDocument`] is built once per input, handed to the
//! serializer, and dropped. Only the Markdown and the per-image
//! [`ImageRecord`]s outlive it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw PDF bytes plus the name they were uploaded under.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A rectangle in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Normalises the corners so that `x0 <= x1` and `y0 <= y1`.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest box containing every point.
    pub fn from_points(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut b = BBox::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            b.x0 = b.x0.min(x);
            b.y0 = b.y0.min(y);
            b.x1 = b.x1.max(x);
            b.y1 = b.y1.max(y);
        }
        Some(b)
    }
}

/// Encoded image payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Jpx,
}

impl ImageFormat {
    /// Upper-case tag used in the serialized size annotation.
    pub fn tag(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Jpx => "JPX",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Jpx => "image/jp2",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Jpx => "jp2",
        }
    }

    /// Sniffs the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(&[0x00, 0x00, 0x00, 0x0C, b'j', b'P'])
            || bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51])
        {
            Some(ImageFormat::Jpx)
        } else {
            None
        }
    }
}

/// An image that is actually drawn on its page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImage {
    /// 0-based discovery index within the page.
    pub index: usize,
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Where the image is drawn, in page coordinates.
    pub bbox: BBox,
}

impl ExtractedImage {
    /// Rendered width in points, truncated.
    pub fn width(&self) -> u32 {
        self.bbox.width().max(0.0) as u32
    }

    /// Rendered height in points, truncated.
    pub fn height(&self) -> u32 {
        self.bbox.height().max(0.0) as u32
    }
}

/// A table: rows of cells, header row first.
pub type Table = Vec<Vec<String>>;

/// Page geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub width: f32,
    pub height: f32,
    /// Clockwise rotation in degrees (0, 90, 180, 270).
    pub rotation: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedPage {
    /// 1-based.
    pub page_number: usize,
    pub text: String,
    pub tables: Vec<Table>,
    /// Ordered by `index`.
    pub images: Vec<ExtractedImage>,
    pub metadata: PageMetadata,
}

impl ExtractedPage {
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            ..Default::default()
        }
    }
}

/// The structured result of one successful extraction strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pages: Vec<ExtractedPage>,
    pub metadata: BTreeMap<String, String>,
    /// Name of the strategy that produced this document.
    pub extractor: String,
}

impl ExtractedDocument {
    /// Builds a document, renumbering pages 1..=n in the given order and
    /// sorting each page's images by index.
    pub fn new(
        mut pages: Vec<ExtractedPage>,
        metadata: BTreeMap<String, String>,
        extractor: impl Into<String>,
    ) -> Self {
        for (i, page) in pages.iter_mut().enumerate() {
            page.page_number = i + 1;
            page.images.sort_by_key(|img| img.index);
        }
        Self {
            pages,
            metadata,
            extractor: extractor.into(),
        }
    }

    pub fn pages(&self) -> &[ExtractedPage] {
        &self.pages
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// A persisted image: where it lives and where it was drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub page_number: usize,
    pub index: usize,
    /// Placeholder key, `page_<N>_img_<I>`.
    pub key: String,
    /// Opaque locator returned by the binary store.
    pub locator: String,
    pub bbox: BBox,
    pub format: ImageFormat,
    pub size_bytes: usize,
}

impl ImageRecord {
    pub fn width(&self) -> u32 {
        self.bbox.width().max(0.0) as u32
    }

    pub fn height(&self) -> u32 {
        self.bbox.height().max(0.0) as u32
    }
}
