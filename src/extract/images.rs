//! Image discovery, on-page placement, and payload decoding.
//!
//! An image XObject can sit in a page's resources without ever being drawn.
//! Only images that are actually painted end up in
//! [`ExtractedPage::images`](crate::model::ExtractedPage), and their size is
//! the rendered rectangle, never the native pixel size.
//!
//! Placement is resolved with two techniques, first hit wins:
//!
//! 1. **Content blocks**: a scan of the page's own content stream that maps
//!    each directly painted image (`/Name Do`) to the rectangle the current
//!    transformation matrix places it in.
//! 2. **Image instances**: every rendered occurrence of the image, including
//!    those painted from inside Form XObjects, each with its own rectangle.
//!
//! An image with no rectangle from either technique is skipped.

use super::objects::{name, number, page_resources, resolve, stream_bytes, xobjects};
use crate::error::ExtractError;
use crate::model::{BBox, ExtractedImage, ImageFormat};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use tracing::{debug, warn};

/// Identifies one embedded image resource (its object id).
pub type ImageRef = ObjectId;

/// Form XObjects nested deeper than this are not followed.
const MAX_FORM_DEPTH: usize = 8;

/// What a page can tell us about its images.
pub trait PageImageSource {
    /// Image resources reachable from the page, in discovery order.
    fn referenced_images(&self) -> Vec<ImageRef>;

    /// Technique 1: bounding box per image painted directly by the page.
    fn content_blocks(&self) -> HashMap<ImageRef, BBox>;

    /// Technique 2: every rendered rectangle of one image.
    fn image_rects(&self, image: ImageRef) -> Vec<BBox>;

    /// Encoded bytes of one image.
    fn image_payload(&self, image: ImageRef) -> Result<(Vec<u8>, ImageFormat), ExtractError>;
}

/// Builds the page's image list.
///
/// `index` is the position in [`PageImageSource::referenced_images`], so an
/// unrendered or undecodable image leaves a gap rather than shifting the
/// indices of the images after it.
pub fn collect_page_images(source: &dyn PageImageSource, page_number: usize) -> Vec<ExtractedImage> {
    let blocks = source.content_blocks();
    let mut images = Vec::new();

    for (index, image_ref) in source.referenced_images().into_iter().enumerate() {
        let bbox = match blocks.get(&image_ref) {
            Some(bbox) => *bbox,
            None => match source.image_rects(image_ref).first() {
                Some(bbox) => *bbox,
                None => {
                    debug!(
                        "Page {}: image {:?} is never drawn, skipping",
                        page_number, image_ref
                    );
                    continue;
                }
            },
        };

        match source.image_payload(image_ref) {
            Ok((data, format)) => images.push(ExtractedImage {
                index,
                data,
                format,
                bbox,
            }),
            Err(e) => warn!("Page {}: image {} skipped: {}", page_number, index, e),
        }
    }

    images
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix([f32; 6]);

impl Matrix {
    pub(crate) const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        let values: Vec<f32> = operands.iter().filter_map(number).collect();
        <[f32; 6]>::try_from(values.as_slice()).ok().map(Matrix)
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Image space is the unit square; its image under the CTM is where it lands.
    fn unit_square(&self) -> BBox {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        BBox::from_points(&corners).unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }
}

/// One painted occurrence of an image.
#[derive(Debug, Clone, Copy)]
struct Placement {
    image: ImageRef,
    bbox: BBox,
    /// Painted by the page's own content stream, not from a form.
    top_level: bool,
}

/// Walks a content stream tracking `q`/`Q`/`cm` and records every `Do` of
/// an image XObject, following Form XObjects.
fn walk_content(
    doc: &Document,
    content: &[u8],
    resources: Option<&Dictionary>,
    ctm: Matrix,
    depth: usize,
    out: &mut Vec<Placement>,
) -> Result<(), ExtractError> {
    let content = Content::decode(content)?;
    let xobjects = xobjects(doc, resources);
    let mut stack: Vec<Matrix> = Vec::new();
    let mut ctm = ctm;

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => {
                if let Some(saved) = stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    ctm = m.then(&ctm);
                }
            }
            "Do" => {
                let Some(id) = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|n| xobjects?.get(n).ok())
                    .and_then(|o| o.as_reference().ok())
                else {
                    continue;
                };
                let Ok(stream) = doc.get_object(id).and_then(|o| o.as_stream()) else {
                    continue;
                };
                match subtype(stream).as_deref() {
                    Some("Image") => out.push(Placement {
                        image: id,
                        bbox: ctm.unit_square(),
                        top_level: depth == 0,
                    }),
                    Some("Form") if depth < MAX_FORM_DEPTH => {
                        let form_matrix = stream
                            .dict
                            .get(b"Matrix")
                            .ok()
                            .and_then(|m| m.as_array().ok())
                            .and_then(|arr| Matrix::from_operands(arr))
                            .unwrap_or(Matrix::IDENTITY);
                        let form_resources = stream
                            .dict
                            .get(b"Resources")
                            .ok()
                            .and_then(|r| resolve(doc, r).ok())
                            .and_then(|r| r.as_dict().ok())
                            .or(resources);
                        let body = stream_bytes(stream)?;
                        walk_content(
                            doc,
                            &body,
                            form_resources,
                            form_matrix.then(&ctm),
                            depth + 1,
                            out,
                        )?;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// A degenerate CTM paints nothing, so its placement does not count.
fn has_area(bbox: &BBox) -> bool {
    bbox.width() > 0.0 && bbox.height() > 0.0
}

fn subtype(stream: &Stream) -> Option<String> {
    stream.dict.get(b"Subtype").ok().and_then(name)
}

/// Image XObjects reachable from a resources dictionary, forms included.
fn discover_images(
    doc: &Document,
    resources: Option<&Dictionary>,
    depth: usize,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<ImageRef>,
) {
    let Some(xobjects) = xobjects(doc, resources) else {
        return;
    };
    for (_, obj) in xobjects.iter() {
        let Ok(id) = obj.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(stream) = doc.get_object(id).and_then(|o| o.as_stream()) else {
            continue;
        };
        match subtype(stream).as_deref() {
            Some("Image") => out.push(id),
            Some("Form") if depth < MAX_FORM_DEPTH => {
                let nested = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve(doc, r).ok())
                    .and_then(|r| r.as_dict().ok());
                discover_images(doc, nested, depth + 1, seen, out);
            }
            _ => {}
        }
    }
}

// ── lopdf-backed source ──────────────────────────────────────────────────

/// [`PageImageSource`] over one page of a parsed lopdf document.
pub struct LopdfPageImages<'a> {
    doc: &'a Document,
    referenced: Vec<ImageRef>,
    placements: Vec<Placement>,
}

impl<'a> LopdfPageImages<'a> {
    /// Scans the page once; both techniques then read from the scan.
    pub fn scan(doc: &'a Document, page_id: ObjectId) -> Result<Self, ExtractError> {
        let resources = page_resources(doc, page_id)?;

        let mut referenced = Vec::new();
        discover_images(doc, resources, 0, &mut HashSet::new(), &mut referenced);

        let mut placements = Vec::new();
        if !referenced.is_empty() {
            let content = super::objects::page_content(doc, page_id)?;
            if !content.is_empty() {
                walk_content(doc, &content, resources, Matrix::IDENTITY, 0, &mut placements)?;
            }
        }

        Ok(Self {
            doc,
            referenced,
            placements,
        })
    }
}

impl PageImageSource for LopdfPageImages<'_> {
    fn referenced_images(&self) -> Vec<ImageRef> {
        self.referenced.clone()
    }

    fn content_blocks(&self) -> HashMap<ImageRef, BBox> {
        let mut blocks = HashMap::new();
        for p in self.placements.iter().filter(|p| p.top_level && has_area(&p.bbox)) {
            blocks.entry(p.image).or_insert(p.bbox);
        }
        blocks
    }

    fn image_rects(&self, image: ImageRef) -> Vec<BBox> {
        self.placements
            .iter()
            .filter(|p| p.image == image)
            .map(|p| p.bbox)
            .filter(has_area)
            .collect()
    }

    fn image_payload(&self, image: ImageRef) -> Result<(Vec<u8>, ImageFormat), ExtractError> {
        let stream = self.doc.get_object(image)?.as_stream()?;
        decode_image_stream(self.doc, stream)
    }
}

// ── Payload decoding ─────────────────────────────────────────────────────

fn filters(stream: &Stream) -> Vec<String> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Array(items)) => items.iter().filter_map(name).collect(),
        Ok(obj) => name(obj).into_iter().collect(),
        Err(_) => Vec::new(),
    }
}

fn unsupported(detail: impl Into<String>) -> ExtractError {
    ExtractError::UnsupportedImage {
        page: 0,
        detail: detail.into(),
    }
}

/// An image XObject after filter decoding.
enum Raster {
    /// Still in a format browsers read directly.
    Encoded(Vec<u8>, ImageFormat),
    Pixels(DynamicImage),
}

/// Returns the image as stored (JPEG, JPEG 2000) or re-encoded as PNG.
///
/// An `/SMask` turns the result into an RGBA PNG; a JPEG 2000 image keeps
/// its encoded form and loses the mask.
pub(crate) fn decode_image_stream(
    doc: &Document,
    stream: &Stream,
) -> Result<(Vec<u8>, ImageFormat), ExtractError> {
    let raster = raster(doc, stream)?;

    let mask = match stream.dict.get(b"SMask").and_then(|o| o.as_reference()) {
        Ok(id) => match doc.get_object(id).and_then(|o| o.as_stream()) {
            Ok(mask_stream) => match soft_mask(doc, mask_stream) {
                Ok(mask) => Some(mask),
                Err(e) => {
                    warn!("Soft mask {:?} ignored: {}", id, e);
                    None
                }
            },
            Err(e) => {
                warn!("Soft mask {:?} unreadable: {}", id, e);
                None
            }
        },
        Err(_) => None,
    };

    let img = match (raster, mask) {
        (Raster::Encoded(bytes, format), None) => return Ok((bytes, format)),
        (Raster::Encoded(bytes, ImageFormat::Jpx), Some(_)) => {
            debug!("JPEG 2000 image kept without its soft mask");
            return Ok((bytes, ImageFormat::Jpx));
        }
        (Raster::Encoded(bytes, _), Some(mask)) => {
            let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)?;
            apply_soft_mask(img, &mask)
        }
        (Raster::Pixels(img), Some(mask)) => apply_soft_mask(img, &mask),
        (Raster::Pixels(img), None) => img,
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok((buf, ImageFormat::Png))
}

fn raster(doc: &Document, stream: &Stream) -> Result<Raster, ExtractError> {
    let filters = filters(stream);
    match filters.last().map(String::as_str) {
        Some("DCTDecode") => {
            return Ok(Raster::Encoded(encoded_body(stream, &filters)?, ImageFormat::Jpeg))
        }
        Some("JPXDecode") => {
            return Ok(Raster::Encoded(encoded_body(stream, &filters)?, ImageFormat::Jpx))
        }
        Some(f @ ("JBIG2Decode" | "CCITTFaxDecode" | "RunLengthDecode")) => {
            return Err(unsupported(format!("filter {f}")))
        }
        _ => {}
    }

    let dict = &stream.dict;
    let dim = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .filter(|v| *v > 0)
            .map(|v| v as usize)
    };
    let (Some(width), Some(height)) = (dim(b"Width"), dim(b"Height")) else {
        return Err(unsupported("missing /Width or /Height"));
    };
    let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let bpc = if is_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8) as u32
    };
    let space = if is_mask {
        ColorSpace::Gray
    } else {
        color_space(doc, dict.get(b"ColorSpace").ok())?
    };

    let raw = stream_bytes(stream)?;
    let indexed = matches!(space, ColorSpace::Indexed { .. });
    let mut samples = unpack_samples(&raw, width * space.components(), height, bpc, !indexed)?;
    if !indexed && inverted_decode(dict) {
        samples.iter_mut().for_each(|s| *s = 255 - *s);
    }
    Ok(Raster::Pixels(to_image(samples, width as u32, height as u32, &space)?))
}

/// Body of a JPEG or JPEG 2000 stream with any preceding filters undone.
fn encoded_body(stream: &Stream, filters: &[String]) -> Result<Vec<u8>, ExtractError> {
    if filters.len() == 1 {
        return Ok(stream.content.clone());
    }
    let mut outer = stream.clone();
    let preceding = filters[..filters.len() - 1]
        .iter()
        .map(|f| Object::Name(f.as_bytes().to_vec()))
        .collect::<Vec<_>>();
    outer.dict.set("Filter", Object::Array(preceding));
    Ok(outer.decompressed_content()?)
}

/// A `/Decode` array starting `[1 0 ...]` flips every sample.
fn inverted_decode(dict: &Dictionary) -> bool {
    let Ok(decode) = dict.get(b"Decode").and_then(|o| o.as_array()) else {
        return false;
    };
    matches!(
        (decode.first().and_then(number), decode.get(1).and_then(number)),
        (Some(lo), Some(hi)) if lo > hi
    )
}

/// Colour space of an image XObject, reduced to what decoding needs.
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// One sample per pixel indexing `palette`, `base.components()` bytes per entry.
    Indexed { base: Box<ColorSpace>, palette: Vec<u8> },
}

impl ColorSpace {
    /// Samples per pixel in the image data.
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

fn color_space(doc: &Document, cs: Option<&Object>) -> Result<ColorSpace, ExtractError> {
    let Some(cs) = cs else {
        return Ok(ColorSpace::Gray);
    };
    let cs = resolve(doc, cs)?;
    if let Some(n) = name(cs) {
        return match n.as_str() {
            "DeviceGray" | "CalGray" | "G" => Ok(ColorSpace::Gray),
            "DeviceRGB" | "CalRGB" | "RGB" => Ok(ColorSpace::Rgb),
            "DeviceCMYK" | "CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(unsupported(format!("colour space {other}"))),
        };
    }
    let arr = cs.as_array()?;
    match arr.first().and_then(name).as_deref() {
        Some("ICCBased") => {
            let profile = arr
                .get(1)
                .ok_or_else(|| unsupported("ICCBased without profile"))?;
            let n = resolve(doc, profile)?
                .as_stream()?
                .dict
                .get(b"N")
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(3);
            match n {
                1 => Ok(ColorSpace::Gray),
                3 => Ok(ColorSpace::Rgb),
                4 => Ok(ColorSpace::Cmyk),
                other => Err(unsupported(format!("ICCBased with {other} components"))),
            }
        }
        Some("CalRGB") => Ok(ColorSpace::Rgb),
        Some("CalGray") => Ok(ColorSpace::Gray),
        Some("Indexed" | "I") => {
            let base = color_space(doc, arr.get(1))?;
            if matches!(base, ColorSpace::Indexed { .. }) {
                return Err(unsupported("nested Indexed colour space"));
            }
            let palette = match arr.get(3).map(|o| resolve(doc, o)).transpose()? {
                Some(Object::String(bytes, _)) => bytes.clone(),
                Some(Object::Stream(lookup)) => stream_bytes(lookup)?,
                _ => return Err(unsupported("Indexed colour space without lookup table")),
            };
            Ok(ColorSpace::Indexed {
                base: Box::new(base),
                palette,
            })
        }
        other => Err(unsupported(format!("colour space {other:?}"))),
    }
}

/// Unpacks `bpc`-bit samples from rows padded to whole bytes.
///
/// With `scale` the samples are stretched to 0..=255 (16-bit keeps the high
/// byte); without it they are returned as-is, which palette indices need.
fn unpack_samples(
    raw: &[u8],
    samples_per_row: usize,
    height: usize,
    bpc: u32,
    scale: bool,
) -> Result<Vec<u8>, ExtractError> {
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(unsupported(format!("{bpc} bits per component")));
    }
    let row_bytes = (samples_per_row * bpc as usize).div_ceil(8);
    let len = row_bytes * height;
    let packed = raw.get(..len).ok_or_else(|| {
        unsupported(format!("truncated pixel data ({} < {len} bytes)", raw.len()))
    })?;

    let max = (1u32 << bpc) - 1;
    let mut out = Vec::with_capacity(samples_per_row * height);
    for row in packed.chunks_exact(row_bytes) {
        for i in 0..samples_per_row {
            let value = match bpc {
                8 => u32::from(row[i]),
                16 => u32::from(u16::from_be_bytes([row[2 * i], row[2 * i + 1]])),
                _ => {
                    let bit = i * bpc as usize;
                    let shift = 8 - bpc as usize - bit % 8;
                    (u32::from(row[bit / 8]) >> shift) & max
                }
            };
            out.push(match (scale, bpc) {
                (true, 16) => (value >> 8) as u8,
                (true, _) => (value * 255 / max) as u8,
                (false, _) => value.min(255) as u8,
            });
        }
    }
    Ok(out)
}

fn to_image(
    samples: Vec<u8>,
    width: u32,
    height: u32,
    space: &ColorSpace,
) -> Result<DynamicImage, ExtractError> {
    match space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| unsupported("gray buffer size")),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| unsupported("rgb buffer size")),
        ColorSpace::Cmyk => {
            let rgb: Vec<u8> = samples
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u16;
                    [
                        ((255 - p[0] as u16) * k / 255) as u8,
                        ((255 - p[1] as u16) * k / 255) as u8,
                        ((255 - p[2] as u16) * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| unsupported("cmyk buffer size"))
        }
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            // Entries past the end of a short lookup table read as zero.
            let colours: Vec<u8> = samples
                .iter()
                .flat_map(|&idx| {
                    let start = idx as usize * n;
                    (start..start + n).map(|i| palette.get(i).copied().unwrap_or(0))
                })
                .collect();
            to_image(colours, width, height, base)
        }
    }
}

/// Decodes an `/SMask` stream to one alpha byte per mask pixel.
fn soft_mask(doc: &Document, stream: &Stream) -> Result<GrayImage, ExtractError> {
    match raster(doc, stream)? {
        Raster::Pixels(img) => Ok(img.to_luma8()),
        Raster::Encoded(bytes, ImageFormat::Jpeg) => {
            Ok(image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)?.to_luma8())
        }
        Raster::Encoded(_, format) => Err(unsupported(format!("{format:?} soft mask"))),
    }
}

fn apply_soft_mask(img: DynamicImage, mask: &GrayImage) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let resized;
    let mask = if mask.dimensions() == (w, h) {
        mask
    } else {
        resized = image::imageops::resize(mask, w, h, FilterType::Triangle);
        &resized
    };
    for (px, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
        px[3] = alpha[0];
    }
    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    /// In-memory source for exercising the selection rules directly.
    struct FakeSource {
        referenced: Vec<ImageRef>,
        blocks: HashMap<ImageRef, BBox>,
        rects: HashMap<ImageRef, Vec<BBox>>,
        broken: HashSet<ImageRef>,
    }

    impl FakeSource {
        fn new(referenced: Vec<ImageRef>) -> Self {
            Self {
                referenced,
                blocks: HashMap::new(),
                rects: HashMap::new(),
                broken: HashSet::new(),
            }
        }
    }

    impl PageImageSource for FakeSource {
        fn referenced_images(&self) -> Vec<ImageRef> {
            self.referenced.clone()
        }
        fn content_blocks(&self) -> HashMap<ImageRef, BBox> {
            self.blocks.clone()
        }
        fn image_rects(&self, image: ImageRef) -> Vec<BBox> {
            self.rects.get(&image).cloned().unwrap_or_default()
        }
        fn image_payload(&self, image: ImageRef) -> Result<(Vec<u8>, ImageFormat), ExtractError> {
            if self.broken.contains(&image) {
                return Err(ExtractError::UnsupportedImage {
                    page: 1,
                    detail: "broken".into(),
                });
            }
            Ok((vec![image.0 as u8], ImageFormat::Png))
        }
    }

    #[test]
    fn unrendered_image_is_skipped() {
        let mut source = FakeSource::new(vec![(10, 0)]);
        source.rects.insert((10, 0), vec![]);
        assert!(collect_page_images(&source, 1).is_empty());
    }

    #[test]
    fn content_block_wins_over_instances() {
        let mut source = FakeSource::new(vec![(10, 0)]);
        let block = BBox::new(0.0, 0.0, 100.0, 50.0);
        source.blocks.insert((10, 0), block);
        source
            .rects
            .insert((10, 0), vec![BBox::new(5.0, 5.0, 6.0, 6.0)]);
        let images = collect_page_images(&source, 1);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].bbox, block);
    }

    #[test]
    fn instance_rect_used_when_no_block() {
        let mut source = FakeSource::new(vec![(10, 0)]);
        let rect = BBox::new(72.0, 500.0, 272.0, 650.0);
        source.rects.insert((10, 0), vec![rect, BBox::new(0.0, 0.0, 1.0, 1.0)]);
        let images = collect_page_images(&source, 1);
        assert_eq!(images[0].bbox, rect);
        assert_eq!((images[0].width(), images[0].height()), (200, 150));
    }

    #[test]
    fn failed_payload_leaves_index_gap() {
        let mut source = FakeSource::new(vec![(10, 0), (11, 0), (12, 0)]);
        for id in [(10, 0), (11, 0), (12, 0)] {
            source.rects.insert(id, vec![BBox::new(0.0, 0.0, 10.0, 10.0)]);
        }
        source.broken.insert((11, 0));
        let indices: Vec<usize> = collect_page_images(&source, 1)
            .iter()
            .map(|i| i.index)
            .collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn matrix_places_unit_square() {
        let ctm = Matrix([200.0, 0.0, 0.0, 100.0, 72.0, 600.0]);
        assert_eq!(ctm.unit_square(), BBox::new(72.0, 600.0, 272.0, 700.0));
    }

    #[test]
    fn matrix_composition_order() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shift = Matrix([1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);
        // Scale first, then shift.
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 22.0));
        // Shift first, then scale.
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 42.0));
    }

    #[test]
    fn raw_rgb_stream_becomes_png() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            vec![255, 0, 0, 0, 255, 0],
        );
        let (bytes, format) = decode_image_stream(&doc, &stream).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(ImageFormat::sniff(&bytes), Some(ImageFormat::Png));
    }

    #[test]
    fn dct_stream_is_passed_through() {
        let doc = Document::with_version("1.5");
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0];
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Filter" => "DCTDecode",
            },
            jpeg.clone(),
        );
        assert_eq!(
            decode_image_stream(&doc, &stream).unwrap(),
            (jpeg, ImageFormat::Jpeg)
        );
    }

    #[test]
    fn truncated_pixels_are_rejected() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 4i64,
                "Height" => 4i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![0; 3],
        );
        assert!(decode_image_stream(&doc, &stream).is_err());
    }

    fn decoded(doc: &Document, stream: &Stream) -> DynamicImage {
        let (bytes, format) = decode_image_stream(doc, stream).unwrap();
        assert_eq!(format, ImageFormat::Png);
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn indexed_palette_maps_to_base_colours() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 3i64,
                "Height" => 1i64,
                "ColorSpace" => vec![
                    Object::Name(b"Indexed".to_vec()),
                    "DeviceRGB".into(),
                    1i64.into(),
                    Object::String(vec![255, 0, 0, 0, 0, 255], StringFormat::Hexadecimal),
                ],
                "BitsPerComponent" => 8i64,
            },
            vec![0, 1, 0],
        );
        let rgb = decoded(&doc, &stream).to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
        assert_eq!(rgb.get_pixel(2, 0).0, [255, 0, 0]);
    }

    #[test]
    fn indexed_lookup_may_be_a_stream_and_indices_packed() {
        let mut doc = Document::with_version("1.5");
        let lookup = doc.add_object(Stream::new(dictionary! {}, vec![0, 128, 255, 64]));
        // 2-bit indices 3, 2, 1, 0 packed into one byte.
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 4i64,
                "Height" => 1i64,
                "ColorSpace" => vec![Object::Name(b"I".to_vec()), "DeviceGray".into(), 3i64.into(), lookup.into()],
                "BitsPerComponent" => 2i64,
            },
            vec![0b1110_0100],
        );
        let gray = decoded(&doc, &stream).to_luma8();
        let row: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(row, vec![64, 255, 128, 0]);
    }

    #[test]
    fn four_bit_gray_rows_are_byte_padded() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 3i64,
                "Height" => 2i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 4i64,
            },
            vec![0x0F, 0x80, 0xF0, 0x00],
        );
        let gray = decoded(&doc, &stream).to_luma8();
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 255, 136, 255, 0, 0]);
    }

    #[test]
    fn sixteen_bit_rgb_keeps_high_byte() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 16i64,
            },
            vec![0xFF, 0xFF, 0x80, 0x00, 0x00, 0x10],
        );
        assert_eq!(decoded(&doc, &stream).to_rgb8().get_pixel(0, 0).0, [255, 128, 0]);
    }

    #[test]
    fn odd_bit_depth_is_rejected() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 3i64,
            },
            vec![0],
        );
        assert!(decode_image_stream(&doc, &stream).is_err());
    }

    #[test]
    fn inverted_decode_array_flips_gray() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
                "Decode" => vec![1i64.into(), 0i64.into()],
            },
            vec![0, 200],
        );
        let values: Vec<u8> = decoded(&doc, &stream).to_luma8().pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![255, 55]);
    }

    #[test]
    fn flate_wrapped_jpeg_is_unwrapped_and_passed_through() {
        let doc = Document::with_version("1.5");
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.extend(std::iter::repeat(0u8).take(256));
        let mut stream = Stream::new(dictionary! { "Subtype" => "Image" }, jpeg.clone());
        stream.compress().unwrap();
        assert!(stream.dict.get(b"Filter").is_ok());
        stream.dict.set(
            "Filter",
            vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())],
        );
        assert_eq!(
            decode_image_stream(&doc, &stream).unwrap(),
            (jpeg, ImageFormat::Jpeg)
        );
    }

    #[test]
    fn soft_mask_becomes_alpha_channel() {
        let mut doc = Document::with_version("1.5");
        let mask = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![255, 0],
        ));
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
                "SMask" => mask,
            },
            vec![10, 20, 30, 40, 50, 60],
        );
        let rgba = decoded(&doc, &stream).to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 255]);
        assert_eq!(rgba.get_pixel(1, 0).0, [40, 50, 60, 0]);
    }

    #[test]
    fn soft_mask_of_other_size_is_stretched() {
        let mut doc = Document::with_version("1.5");
        let mask = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![128],
        ));
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 2i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
                "SMask" => mask,
            },
            vec![0; 4],
        );
        let rgba = decoded(&doc, &stream).to_rgba8();
        assert!(rgba.pixels().all(|p| (127..=128).contains(&p[3])));
    }

    /// Adds a one-page tree to `doc`; the page draws `content` with `xobjects`.
    fn add_page(doc: &mut Document, content: &str, xobjects: Dictionary) -> ObjectId {
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1,
            }),
        );
        page_id
    }

    fn add_gray_pixel(doc: &mut Document) -> ObjectId {
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1i64,
                "Height" => 1i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![128],
        ))
    }

    #[test]
    fn image_inside_form_is_placed_through_both_matrices() {
        let mut doc = Document::with_version("1.5");
        let image = add_gray_pixel(&mut doc);
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => image },
                },
            },
            b"q 50 0 0 40 10 20 cm /Im1 Do Q".to_vec(),
        ));
        let page = add_page(
            &mut doc,
            "q 1 0 0 1 100 100 cm /Fm1 Do Q",
            dictionary! { "Fm1" => form },
        );

        let source = LopdfPageImages::scan(&doc, page).unwrap();
        assert_eq!(source.referenced_images(), vec![image]);
        // Painted from a form, so only the instance technique sees it.
        assert!(source.content_blocks().is_empty());
        let expected = BBox::new(110.0, 120.0, 160.0, 160.0);
        assert_eq!(source.image_rects(image), vec![expected]);

        let images = collect_page_images(&source, 1);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].index, 0);
        assert_eq!(images[0].bbox, expected);
        assert_eq!((images[0].width(), images[0].height()), (50, 40));
    }

    #[test]
    fn form_matrix_is_applied_before_page_ctm() {
        let mut doc = Document::with_version("1.5");
        let image = add_gray_pixel(&mut doc);
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Form",
                "Matrix" => vec![2.into(), 0.into(), 0.into(), 2.into(), 5.into(), 5.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => image },
                },
            },
            b"q 10 0 0 10 0 0 cm /Im1 Do Q".to_vec(),
        ));
        let page = add_page(&mut doc, "q 1 0 0 1 50 60 cm /Fm1 Do Q", dictionary! { "Fm1" => form });

        let source = LopdfPageImages::scan(&doc, page).unwrap();
        assert_eq!(
            source.image_rects(image),
            vec![BBox::new(55.0, 65.0, 75.0, 85.0)]
        );
    }

    #[test]
    fn zero_area_placement_is_not_a_content_block() {
        let mut doc = Document::with_version("1.5");
        let image = add_gray_pixel(&mut doc);
        let page = add_page(&mut doc, "q 0 0 0 0 72 500 cm /Im1 Do Q", dictionary! { "Im1" => image });

        let source = LopdfPageImages::scan(&doc, page).unwrap();
        assert_eq!(source.referenced_images(), vec![image]);
        assert!(source.content_blocks().is_empty());
        assert!(source.image_rects(image).is_empty());
        assert!(collect_page_images(&source, 1).is_empty());
    }

    #[test]
    fn direct_placement_is_a_content_block() {
        let mut doc = Document::with_version("1.5");
        let image = add_gray_pixel(&mut doc);
        let page = add_page(&mut doc, "q 200 0 0 150 72 500 cm /Im1 Do Q", dictionary! { "Im1" => image });

        let source = LopdfPageImages::scan(&doc, page).unwrap();
        assert_eq!(
            source.content_blocks().get(&image),
            Some(&BBox::new(72.0, 500.0, 272.0, 650.0))
        );
    }
}
