//! Positioned text spans read straight from a page content stream.
//!
//! Only the text-positioning operators are interpreted (`Tm`, `Td`, `TD`,
//! `T*`, `TL`, `Tf` and the show operators). That is enough to recover the
//! rows and columns the table detector needs; it is not a layout engine.

use super::objects::{number, page_content};
use crate::error::ExtractError;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

/// A run of text drawn at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    /// Left edge in page coordinates.
    pub x: f32,
    /// Baseline in page coordinates.
    pub y: f32,
    /// Estimated advance width.
    pub width: f32,
    pub font_size: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, x: f32, y: f32, font_size: f32) -> Self {
        let text = text.into();
        // Half an em per glyph is a usable average for Latin text.
        let width = text.chars().count() as f32 * font_size * 0.5;
        Self {
            text,
            x,
            y,
            width,
            font_size,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    // Text line matrix.
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
    leading: f32,
    // Horizontal advance of shown text since the start of the line.
    advance: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
            leading: 0.0,
            advance: 0.0,
        }
    }
}

impl TextState {
    fn set(&mut self, m: [f32; 6]) {
        self.a = m[0];
        self.b = m[1];
        self.c = m[2];
        self.d = m[3];
        self.e = m[4];
        self.f = m[5];
        self.advance = 0.0;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.e += tx * self.a + ty * self.c;
        self.f += tx * self.b + ty * self.d;
        self.advance = 0.0;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.translate(0.0, -leading);
    }

    fn scale(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }
}

/// Extracts every non-blank span on a page, in content-stream order.
pub fn page_spans(doc: &Document, page_id: ObjectId) -> Result<Vec<TextSpan>, ExtractError> {
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let decode = |font: &[u8], bytes: &[u8]| -> String {
        fonts
            .get(font)
            .and_then(|f| f.get_font_encoding(doc).ok())
            .and_then(|enc| Document::decode_text(&enc, bytes).ok())
            .unwrap_or_else(|| decode_plain(bytes))
    };

    let content = page_content(doc, page_id)?;
    if content.is_empty() {
        return Ok(Vec::new());
    }
    let content = Content::decode(&content)?;
    Ok(spans_from_operations(&content.operations, &decode))
}

/// `decode` turns a show-operator string into text for the given font resource name.
fn spans_from_operations(
    operations: &[lopdf::content::Operation],
    decode: &dyn Fn(&[u8], &[u8]) -> String,
) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut state = TextState::default();
    let mut font: Vec<u8> = Vec::new();
    let mut font_size: f32 = 12.0;
    let mut in_text = false;

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                in_text = true;
                let leading = state.leading;
                state = TextState {
                    leading,
                    ..TextState::default()
                };
            }
            "ET" => in_text = false,
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    font = name.clone();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    font_size = size;
                }
            }
            "TL" => {
                if let Some(l) = operands.first().and_then(number) {
                    state.leading = l;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.translate(tx, ty);
            }
            "Tm" => {
                let values: Vec<f32> = operands.iter().filter_map(number).collect();
                if let Ok(m) = <[f32; 6]>::try_from(values.as_slice()) {
                    state.set(m);
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" | "TJ" if in_text => {
                if op.operator != "Tj" && op.operator != "TJ" {
                    state.next_line();
                }
                let decode_font = |bytes: &[u8]| decode(font.as_slice(), bytes);
                let text = match op.operator.as_str() {
                    "TJ" => operands
                        .first()
                        .and_then(|o| o.as_array().ok())
                        .map(|arr| decode_array(arr, &decode_font))
                        .unwrap_or_default(),
                    "\"" => operands
                        .get(2)
                        .map(|o| decode_operand(o, &decode_font))
                        .unwrap_or_default(),
                    _ => operands
                        .first()
                        .map(|o| decode_operand(o, &decode_font))
                        .unwrap_or_default(),
                };
                if !text.trim().is_empty() {
                    let size = font_size * state.scale().max(f32::EPSILON);
                    let span = TextSpan::new(text, state.e + state.advance, state.f, size);
                    state.advance += span.width;
                    spans.push(span);
                }
            }
            _ => {}
        }
    }

    spans
}

fn decode_operand(obj: &Object, decode: &dyn Fn(&[u8]) -> String) -> String {
    match obj {
        Object::String(bytes, _) => decode(bytes),
        _ => String::new(),
    }
}

fn decode_array(items: &[Object], decode: &dyn Fn(&[u8]) -> String) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => out.push_str(&decode(bytes)),
            other => {
                // Large negative kerning is how most producers encode a word gap.
                if let Some(adjust) = number(other) {
                    if -adjust > 200.0 && !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                }
            }
        }
    }
    out
}

/// UTF-16BE with BOM, then UTF-8, then Latin-1.
pub(crate) fn decode_plain(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
